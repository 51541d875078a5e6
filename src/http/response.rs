//! Response handling and transformation.
//!
//! # Responsibilities
//! - Relay the backend response to the client
//! - Map forwarding failures to gateway status codes
//!
//! # Design Decisions
//! - Streaming responses avoid buffering the entire body
//! - Hop-by-hop headers stripped automatically
//! - Backend connect timeouts result in 504 Gateway Timeout

use axum::body::Body;
use axum::http::Response as HttpResponse;
use axum::response::{IntoResponse, Response};

use crate::http::request::strip_hop_by_hop;
use crate::proxy::{BackendTarget, ForwardError, RelayBody};

/// Turn the backend's response into the client's response.
///
/// Status, end-to-end headers and body frames pass through unchanged.
pub fn relay(backend: HttpResponse<RelayBody>) -> Response {
    let (mut parts, body) = backend.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

/// Response for a request that never reached (or never heard back from)
/// the backend.
pub fn forward_failure(err: &ForwardError, target: &BackendTarget) -> Response {
    let status = err.status();
    tracing::warn!(
        backend = %target,
        status = status.as_u16(),
        error = %err,
        "Forwarding failed"
    );
    (status, status.canonical_reason().unwrap_or("Bad Gateway")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn failures_map_to_gateway_statuses() {
        let target = BackendTarget::new("db", 5984);
        let refused = ForwardError::Connect {
            authority: target.authority(),
            source: std::io::ErrorKind::ConnectionRefused.into(),
        };

        let response = forward_failure(&refused, &target);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Bad Gateway");

        let response = forward_failure(&ForwardError::ConnectTimeout(target.authority()), &target);
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
