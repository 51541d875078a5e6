//! Per-request forwarding failures.

use axum::http::StatusCode;
use thiserror::Error;

/// Why a request could not be relayed to the backend.
///
/// Always contained to the request that raised it.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to connect to backend {authority}: {source}")]
    Connect {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to backend {0}")]
    ConnectTimeout(String),

    #[error("TLS handshake with backend {authority} failed: {source}")]
    Handshake {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend host {0:?} is not a valid TLS server name")]
    ServerName(String),

    #[error("backend TLS requested but no TLS connector is configured")]
    TlsUnavailable,

    #[error("HTTP exchange with backend failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("could not build the backend request: {0}")]
    Request(#[from] axum::http::Error),
}

impl ForwardError {
    /// Status returned to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::ConnectTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::Request(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}
