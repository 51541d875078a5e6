//! The proxy resource tree.
//!
//! Every node forwards to one [`BackendTarget`]. Deeper URL segments are
//! handled by child nodes derived on demand; each child extends the path and
//! inherits host, port and the backend TLS flag from its parent. The flag is
//! never re-derived from the target, so a deep path can't silently drop to
//! plaintext.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};

use crate::http::{request, response};
use crate::observability::metrics;
use crate::proxy::{BackendTarget, ForwardError, ForwardingConnectionFactory};

/// One node of the proxy tree.
#[derive(Debug, Clone)]
pub struct ProxyNode {
    target: BackendTarget,
    backend_tls: bool,
    max_body_bytes: usize,
    factory: Arc<ForwardingConnectionFactory>,
}

impl ProxyNode {
    /// Root node, forwarding to the backend's root path.
    pub fn root(
        target: BackendTarget,
        backend_tls: bool,
        max_body_bytes: usize,
        factory: Arc<ForwardingConnectionFactory>,
    ) -> Self {
        Self {
            target,
            backend_tls,
            max_body_bytes,
            factory,
        }
    }

    pub fn target(&self) -> &BackendTarget {
        &self.target
    }

    /// Whether legs opened by this node speak TLS to the backend.
    pub fn backend_tls(&self) -> bool {
        self.backend_tls
    }

    /// Node for the next path segment below this one.
    ///
    /// Host and port are inherited as-is: redirects from the backend are
    /// relayed to the client, never followed here.
    pub fn child_for(&self, segment: &str) -> ProxyNode {
        ProxyNode {
            target: self.target.child(segment),
            backend_tls: self.backend_tls,
            max_body_bytes: self.max_body_bytes,
            factory: Arc::clone(&self.factory),
        }
    }

    /// Walk from this node down to the node owning `path`.
    ///
    /// Segments are kept as they arrived (still percent-encoded), so the
    /// backend sees the same path the client sent.
    pub fn resolve(&self, path: &str) -> ProxyNode {
        path.strip_prefix('/')
            .unwrap_or(path)
            .split('/')
            .fold(self.clone(), |node, segment| node.child_for(segment))
    }

    /// Forward `request` to this node's target and relay the answer.
    ///
    /// The inbound body is read completely before the backend leg opens.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        tracing::debug!(
            method = %request.method(),
            uri = %request.uri(),
            backend = %self.target,
            tls = self.backend_tls,
            "-> backend"
        );

        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, self.max_body_bytes).await {
            Ok(body) => body,
            Err(err) => {
                let status = request::body_read_status(&err);
                tracing::warn!(error = %err, status = %status, "Failed to read request body");
                metrics::record_proxied(status.as_u16());
                return status.into_response();
            }
        };

        match self.forward(parts, body).await {
            Ok(response) => {
                metrics::record_proxied(response.status().as_u16());
                response
            }
            Err(err) => {
                metrics::record_proxied(err.status().as_u16());
                response::forward_failure(&err, &self.target)
            }
        }
    }

    async fn forward(
        &self,
        parts: axum::http::request::Parts,
        body: bytes::Bytes,
    ) -> Result<Response, ForwardError> {
        let outbound = request::backend_request(&parts, &self.target, body)?;
        let leg = self.factory.open(&self.target, self.backend_tls).await?;
        let backend_response = leg.forward(outbound).await?;
        Ok(response::relay(backend_response))
    }
}
