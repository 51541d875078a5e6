//! Bridge between the event loop and the application handler.
//!
//! # Responsibilities
//! - Define the [`Application`] seam served under `/_api`
//! - Buffer the request body and run the handler on the blocking pool
//! - Provide [`InfoApplication`], the built-in default handler
//!
//! # Design Decisions
//! - Handlers are synchronous and may block; they never run on the event loop
//! - Requests reach the handler with the `/_api` prefix already stripped

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, Request, Response as HttpResponse, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use serde::Serialize;

use crate::http::request;
use crate::lifecycle::BlockingPool;

/// Application logic mounted under `/_api`.
pub trait Application: Send + Sync + 'static {
    /// Answer one request. May block.
    fn handle(&self, request: Request<Bytes>) -> HttpResponse<Bytes>;
}

/// Runs an [`Application`] on the blocking pool.
#[derive(Clone)]
pub struct ApplicationBridge {
    application: Arc<dyn Application>,
    pool: BlockingPool,
    max_body_bytes: usize,
}

impl ApplicationBridge {
    pub fn new(application: Arc<dyn Application>, pool: BlockingPool, max_body_bytes: usize) -> Self {
        Self {
            application,
            pool,
            max_body_bytes,
        }
    }

    /// Router answering every path with the application.
    pub fn into_router(self) -> Router {
        Router::new().fallback(dispatch).with_state(Arc::new(self))
    }

    pub async fn call(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(err) => {
                let status = request::body_read_status(&err);
                tracing::warn!(error = %err, status = %status, "Failed to read application request body");
                return status.into_response();
            }
        };

        let application = Arc::clone(&self.application);
        let request = Request::from_parts(parts, body);
        match self.pool.run(move || application.handle(request)).await {
            Ok(response) => response.map(Body::from),
            Err(err) => {
                tracing::error!(error = %err, "Application handler failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

async fn dispatch(State(bridge): State<Arc<ApplicationBridge>>, request: Request<Body>) -> Response {
    bridge.call(request).await
}

#[derive(Debug, Serialize)]
struct ServerInfo {
    name: &'static str,
    version: &'static str,
}

/// Default application: reports the server version at `GET /v1/info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfoApplication;

impl Application for InfoApplication {
    fn handle(&self, request: Request<Bytes>) -> HttpResponse<Bytes> {
        if request.uri().path() != "/v1/info" {
            return status_only(StatusCode::NOT_FOUND);
        }
        if request.method() != Method::GET {
            return status_only(StatusCode::METHOD_NOT_ALLOWED);
        }

        let info = ServerInfo {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        };
        match serde_json::to_vec(&info) {
            Ok(body) => {
                let mut response = HttpResponse::new(Bytes::from(body));
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                response
            }
            Err(_) => status_only(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

fn status_only(status: StatusCode) -> HttpResponse<Bytes> {
    let mut response = HttpResponse::new(Bytes::new());
    *response.status_mut() = status;
    response
}
