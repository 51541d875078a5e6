//! Opens backend legs, plain or TLS-wrapped.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::net::tls::{backend_client_config, TlsError, TlsPolicy};
use crate::net::ConnectionTracker;
use crate::proxy::{BackendTarget, ForwardError, ForwardingConnection};

/// Transport under a backend leg.
pub enum BackendStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl BackendStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, BackendStream::Tls(_))
    }
}

impl AsyncRead for BackendStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            BackendStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            BackendStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for BackendStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            BackendStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            BackendStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            BackendStream::Plain(s) => Pin::new(s).poll_flush(cx),
            BackendStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            BackendStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            BackendStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Produces one [`ForwardingConnection`] per proxied request.
///
/// The TLS connector is prepared once, from the backend certificate, when
/// backend-facing TLS is on. Whether a given leg uses it is decided by the
/// caller's flag each time a leg is opened.
pub struct ForwardingConnectionFactory {
    connector: Option<TlsConnector>,
    connect_timeout: Duration,
    legs: ConnectionTracker,
}

impl ForwardingConnectionFactory {
    /// Build the factory for `policy`. Fails when backend TLS is requested
    /// without a readable certificate.
    pub fn new(policy: &TlsPolicy, connect_timeout: Duration) -> Result<Self, TlsError> {
        let connector = if policy.backend_facing {
            let anchor = policy
                .backend_trust_anchor()
                .ok_or(TlsError::MissingMaterial {
                    direction: "backend-facing",
                    missing: "certificate",
                })?;
            let config = backend_client_config(anchor)?;
            Some(TlsConnector::from(Arc::new(config)))
        } else {
            None
        };

        Ok(Self {
            connector,
            connect_timeout,
            legs: ConnectionTracker::new(),
        })
    }

    /// Backend legs currently open.
    pub fn in_flight(&self) -> u64 {
        self.legs.active_count()
    }

    /// Open a leg to `target`. With `backend_tls` the TLS handshake, including
    /// verification of the backend certificate, completes before any request
    /// byte is written.
    pub async fn open(
        &self,
        target: &BackendTarget,
        backend_tls: bool,
    ) -> Result<ForwardingConnection, ForwardError> {
        let authority = target.authority();
        let guard = self.legs.track();

        let stream = tokio::time::timeout(self.connect_timeout, self.connect(target, backend_tls))
            .await
            .map_err(|_| ForwardError::ConnectTimeout(authority.clone()))??;

        tracing::debug!(
            connection_id = %guard.id(),
            backend = %authority,
            tls = stream.is_tls(),
            "Backend leg opened"
        );
        ForwardingConnection::establish(stream, authority, guard).await
    }

    async fn connect(
        &self,
        target: &BackendTarget,
        backend_tls: bool,
    ) -> Result<BackendStream, ForwardError> {
        let connector = match (backend_tls, &self.connector) {
            (false, _) => None,
            (true, Some(connector)) => Some(connector),
            (true, None) => return Err(ForwardError::TlsUnavailable),
        };

        let tcp = TcpStream::connect((target.host(), target.port()))
            .await
            .map_err(|source| ForwardError::Connect {
                authority: target.authority(),
                source,
            })?;
        if let Err(err) = tcp.set_nodelay(true) {
            tracing::debug!(backend = %target.authority(), error = %err, "Failed to set TCP_NODELAY on backend leg");
        }

        let Some(connector) = connector else {
            return Ok(BackendStream::Plain(tcp));
        };

        let server_name = ServerName::try_from(target.host().to_string())
            .map_err(|_| ForwardError::ServerName(target.host().to_string()))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|source| ForwardError::Handshake {
                authority: target.authority(),
                source,
            })?;
        Ok(BackendStream::Tls(Box::new(tls)))
    }
}

impl std::fmt::Debug for ForwardingConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingConnectionFactory")
            .field("backend_tls", &self.connector.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
