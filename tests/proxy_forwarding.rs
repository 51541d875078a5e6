//! End-to-end forwarding through the proxy root to a plain backend.

mod common;

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use axum::http::{Request, Response};
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use frontdoor::config::ServerConfig;
use frontdoor::http::Application;
use frontdoor::lifecycle::build_runtime;

use common::{
    config_for, ok_response, start_frontdoor, start_frontdoor_with, start_recording_backend,
    start_silent_backend, start_truncating_backend, ErrorCounter,
};

#[tokio::test]
async fn deep_path_is_forwarded_with_query_and_headers() {
    let (backend, mut seen) = start_recording_backend(ok_response("deep")).await;
    let server = start_frontdoor(config_for(backend)).await;

    let response = reqwest::Client::new()
        .put(server.url("/some/deep/path?rev=1-abc&batch=ok"))
        .header("x-custom", "kept")
        .header("keep-alive", "timeout=5")
        .body("{\"a\":1}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-backend"], "mock");
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "deep");

    let request = seen.recv().await.unwrap();
    assert_eq!(request.request_line(), "PUT /some/deep/path?rev=1-abc&batch=ok HTTP/1.1");
    assert_eq!(request.header("host"), Some(format!("127.0.0.1:{}", backend.port()).as_str()));
    assert_eq!(request.header("connection"), Some("close"));
    assert_eq!(request.header("x-custom"), Some("kept"));
    assert_eq!(request.header("keep-alive"), None);
    assert!(request.header("x-request-id").is_some());
    assert_eq!(request.body, b"{\"a\":1}");

    server.stop().await;
}

#[tokio::test]
async fn root_path_reaches_backend_root() {
    let (backend, mut seen) = start_recording_backend(ok_response("{\"couchdb\":\"Welcome\"}")).await;
    let server = start_frontdoor(config_for(backend)).await;

    let body = reqwest::get(server.url("/")).await.unwrap().text().await.unwrap();
    assert!(body.contains("Welcome"));
    assert_eq!(seen.recv().await.unwrap().request_line(), "GET / HTTP/1.1");

    server.stop().await;
}

#[tokio::test]
async fn each_request_opens_its_own_backend_connection() {
    let (backend, mut seen) = start_recording_backend(ok_response("ok")).await;
    let server = start_frontdoor(config_for(backend)).await;
    let client = reqwest::Client::new();

    for i in 0..3 {
        let response = client.get(server.url(&format!("/db/doc{i}"))).send().await.unwrap();
        assert_eq!(response.text().await.unwrap(), "ok");
    }
    for i in 0..3 {
        let request = seen.recv().await.unwrap();
        assert_eq!(request.request_line(), format!("GET /db/doc{i} HTTP/1.1"));
    }

    server.stop().await;
}

#[tokio::test]
async fn unreachable_backend_is_bad_gateway() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let backend = closed.local_addr().unwrap();
    drop(closed);

    let server = start_frontdoor(config_for(backend)).await;
    let response = reqwest::get(server.url("/db")).await.unwrap();
    assert_eq!(response.status(), 502);

    // the failure stays with that request
    let info = reqwest::get(server.url("/_api/v1/info")).await.unwrap();
    assert_eq!(info.status(), 200);

    server.stop().await;
}

#[tokio::test]
async fn backend_dropping_mid_response_truncates_and_server_survives() {
    let errors = ErrorCounter::new("frontdoor::proxy");
    let _subscriber = errors.install();

    let backend = start_truncating_backend(100, "only ten b").await;
    let server = start_frontdoor(config_for(backend)).await;

    let response = reqwest::get(server.url("/db/_changes")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.bytes().await.is_err());

    // the backend leg reports the cut-off body once, at ERROR
    tokio::time::timeout(Duration::from_secs(5), async {
        while errors.count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(errors.count(), 1);

    let again = reqwest::get(server.url("/_api/v1/info")).await.unwrap();
    assert_eq!(again.status(), 200);

    server.stop().await;
}

#[tokio::test]
async fn client_disconnect_closes_the_backend_leg() {
    let (backend, seen, closed) = start_silent_backend().await;
    let server = start_frontdoor(config_for(backend)).await;

    let mut client = TcpStream::connect(server.http_addr).await.unwrap();
    client
        .write_all(b"GET /db/_changes?feed=longpoll HTTP/1.1\r\nHost: frontdoor\r\n\r\n")
        .await
        .unwrap();

    let request = tokio::time::timeout(Duration::from_secs(5), seen)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.request_line(), "GET /db/_changes?feed=longpoll HTTP/1.1");

    drop(client);
    tokio::time::timeout(Duration::from_secs(5), closed)
        .await
        .expect("backend leg was not closed")
        .unwrap();

    let info = reqwest::get(server.url("/_api/v1/info")).await.unwrap();
    assert_eq!(info.status(), 200);

    server.stop().await;
}

/// Holds its blocking thread until released.
struct StalledApplication {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl Application for StalledApplication {
    fn handle(&self, _request: Request<Bytes>) -> Response<Bytes> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv_timeout(Duration::from_secs(10));
        Response::new(Bytes::from_static(b"released"))
    }
}

#[test]
fn busy_application_pool_does_not_stall_hostname_backends() {
    let server_config = ServerConfig {
        worker_threads: 1,
        ..Default::default()
    };
    let runtime = build_runtime(&server_config).unwrap();

    runtime.block_on(async {
        let (backend, mut seen) = start_recording_backend(ok_response("resolved")).await;
        let mut config = config_for(backend);
        config.server = server_config.clone();
        config.server.bind_address = "127.0.0.1".into();
        // resolved through the blocking pool
        config.backend.host = "localhost".into();

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let application = StalledApplication {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        let server = start_frontdoor_with(config, Arc::new(application)).await;

        let stalled_url = server.url("/_api/v1/slow");
        let stalled = tokio::spawn(async move {
            reqwest::get(stalled_url).await.unwrap().text().await.unwrap()
        });
        tokio::time::timeout(Duration::from_secs(5), async {
            while entered_rx.try_recv().is_err() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let response = reqwest::get(server.url("/db/doc")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "resolved");
        assert_eq!(seen.recv().await.unwrap().request_line(), "GET /db/doc HTTP/1.1");

        release_tx.send(()).unwrap();
        assert_eq!(stalled.await.unwrap(), "released");

        server.stop().await;
    });
}
