//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate the request ID (UUID v4) for every inbound request
//! - Strip hop-by-hop headers before forwarding
//! - Build the backend-bound copy of a proxied request
//! - Map inbound body read failures to a status
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The inbound request is consumed; the forwarded copy owns the body
//! - `Connection: close` on every backend request (one leg per request)

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use http_body_util::{Full, LengthLimitError};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::proxy::BackendTarget;

/// Header carrying the request ID.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Headers that describe one hop and must not be relayed.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Status for a failed inbound body read: 413 past the limit, 400 otherwise.
pub fn body_read_status(err: &axum::Error) -> StatusCode {
    let too_large = std::error::Error::source(err).is_some_and(|source| source.is::<LengthLimitError>());
    if too_large {
        StatusCode::PAYLOAD_TOO_LARGE
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// Generates UUID v4 request IDs for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdGenerator;

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Build the request sent over a backend leg.
///
/// Method, version-independent headers, query string and body are kept;
/// `Host` points at the backend and the leg is closed after the response.
pub fn backend_request(
    parts: &Parts,
    target: &BackendTarget,
    body: Bytes,
) -> Result<Request<Full<Bytes>>, axum::http::Error> {
    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);

    let host = HeaderValue::from_str(&target.host_header())?;
    headers.insert(header::HOST, host);
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));

    let mut builder = Request::builder()
        .method(parts.method.clone())
        .uri(target.path_and_query(parts.uri.query()));
    if let Some(map) = builder.headers_mut() {
        map.extend(headers);
    }
    builder.body(Full::new(body))
}
