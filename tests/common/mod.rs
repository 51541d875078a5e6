//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use frontdoor::config::FrontdoorConfig;
use frontdoor::http::{Application, BroadcastHub, InfoApplication, ServerAssembler};
use frontdoor::lifecycle::{Shutdown, StartupError};
use frontdoor::net::tls::load_server_config;

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Counts ERROR events whose target starts with a prefix.
#[derive(Clone)]
pub struct ErrorCounter {
    prefix: &'static str,
    count: Arc<AtomicUsize>,
}

impl ErrorCounter {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Install as this thread's subscriber until the guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }
}

impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() == tracing::Level::ERROR && metadata.target().starts_with(self.prefix) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Request head (and body) as a backend received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// Read one request from `stream`. `None` if the peer hung up first.
pub async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut request = RecordedRequest {
        head,
        body: buf[head_end..].to_vec(),
    };
    let length: usize = request
        .header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while request.body.len() < length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        request.body.extend_from_slice(&chunk[..n]);
    }
    Some(request)
}

pub fn ok_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nX-Backend: mock\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

async fn answer<S>(mut socket: S, response: String, seen: mpsc::UnboundedSender<RecordedRequest>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Some(request) = read_request(&mut socket).await {
        let _ = seen.send(request);
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    }
}

/// Backend that writes `response` as soon as a connection arrives,
/// without reading anything.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let reply = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });
    addr
}

/// Plain backend that records every request and answers with `response`.
pub async fn start_recording_backend(
    response: String,
) -> (SocketAddr, mpsc::UnboundedReceiver<RecordedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(answer(socket, response.clone(), tx.clone()));
        }
    });
    (addr, rx)
}

/// TLS backend presenting the `localhost` fixture certificate.
pub async fn start_tls_backend(
    response: String,
) -> (SocketAddr, mpsc::UnboundedReceiver<RecordedRequest>) {
    let tls = load_server_config(&fixture("localhost.pem"), &fixture("localhost.key")).unwrap();
    let acceptor = TlsAcceptor::from(tls.get_inner());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let response = response.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Ok(stream) = acceptor.accept(socket).await {
                    answer(stream, response, tx).await;
                }
            });
        }
    });
    (addr, rx)
}

/// Backend that promises `promised` body bytes, sends `sent`, then hangs up.
pub async fn start_truncating_backend(promised: usize, sent: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_request(&mut socket).await.is_some() {
                    let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {promised}\r\n\r\n");
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(sent.as_bytes()).await;
                    let _ = socket.flush().await;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                // dropped: connection reset / EOF mid-body
            });
        }
    });
    addr
}

/// Backend that reads a request and never answers.
///
/// Returns a receiver for the request and one that fires when the proxy
/// closes its side of the connection.
pub async fn start_silent_backend() -> (
    SocketAddr,
    oneshot::Receiver<RecordedRequest>,
    oneshot::Receiver<()>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = oneshot::channel();
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        if let Some(request) = read_request(&mut socket).await {
            let _ = seen_tx.send(request);
        }
        let mut rest = [0u8; 64];
        loop {
            match socket.read(&mut rest).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        let _ = closed_tx.send(());
    });
    (addr, seen_rx, closed_rx)
}

/// Config pointing the proxy at a plain backend on `backend`.
pub fn config_for(backend: SocketAddr) -> FrontdoorConfig {
    let mut config = FrontdoorConfig::default();
    config.server.bind_address = "127.0.0.1".into();
    config.backend.host = backend.ip().to_string();
    config.backend.port = backend.port();
    config.timeouts.connect_secs = 2;
    config.timeouts.shutdown_grace_secs = 1;
    config
}

/// A server started on ephemeral ports.
pub struct RunningFrontdoor {
    pub http_addr: SocketAddr,
    pub ws_addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), StartupError>>,
}

impl RunningFrontdoor {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.http_addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

pub async fn start_frontdoor(config: FrontdoorConfig) -> RunningFrontdoor {
    start_frontdoor_with(config, Arc::new(InfoApplication)).await
}

pub async fn start_frontdoor_with(
    config: FrontdoorConfig,
    application: Arc<dyn Application>,
) -> RunningFrontdoor {
    let assembler = ServerAssembler::new(config, application).unwrap();
    let primary = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let websocket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = primary.local_addr().unwrap();
    let ws_addr = websocket.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    let task = tokio::spawn(async move {
        assembler
            .serve(primary, websocket, Arc::new(BroadcastHub::default()), &signal)
            .await
    });

    RunningFrontdoor {
        http_addr,
        ws_addr,
        shutdown,
        task,
    }
}
