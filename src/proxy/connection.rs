//! One backend leg for one proxied request.
//!
//! # Lifecycle
//! ```text
//! establish: HTTP/1.1 handshake over a plain or TLS stream
//!     → driver task owns the socket
//! forward:   send request, hand the response body to the client as RelayBody
//! teardown:  body complete → backend closes cleanly
//!            client gone   → RelayBody dropped early → driver aborts the leg
//!            backend error → connection or body failure logged at ERROR
//!     → guard released, `on_close` waiters woken
//! ```
//!
//! A client that vanishes while the backend is still sending makes the
//! driver report [`BENIGN_TEARDOWN_SIGNATURE`]. That race is expected and is
//! never logged as an error.

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::{Request, Response};
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, watch};

use crate::net::{ConnectionGuard, ConnectionId};
use crate::observability::metrics;
use crate::proxy::ForwardError;

/// Message carried by the teardown error raised when the client leg is gone
/// before the backend response was fully relayed.
pub const BENIGN_TEARDOWN_SIGNATURE: &str =
    "response finished after the client connection was lost";

/// The client leg went away mid-exchange.
#[derive(Debug, Error)]
#[error("{}", BENIGN_TEARDOWN_SIGNATURE)]
pub struct ClientGone;

/// How a backend leg ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownKind {
    /// Backend closed normally.
    Clean,
    /// The known client/backend teardown race.
    Benign,
    /// Anything else.
    Failed,
}

impl TeardownKind {
    /// Classify a teardown outcome. Any error in the chain whose message
    /// carries the benign signature makes the whole teardown benign.
    pub fn of(outcome: Result<(), &(dyn StdError + 'static)>) -> Self {
        let Err(err) = outcome else {
            return TeardownKind::Clean;
        };

        let mut current = Some(err);
        while let Some(err) = current {
            if err.to_string().contains(BENIGN_TEARDOWN_SIGNATURE) {
                return TeardownKind::Benign;
            }
            current = err.source();
        }
        TeardownKind::Failed
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TeardownKind::Clean => "clean",
            TeardownKind::Benign => "benign",
            TeardownKind::Failed => "failed",
        }
    }
}

/// Report the end of a backend leg.
///
/// Only [`TeardownKind::Failed`] is logged at ERROR.
pub fn connection_lost(
    connection_id: ConnectionId,
    backend: &str,
    outcome: Result<(), &(dyn StdError + 'static)>,
) -> TeardownKind {
    let kind = TeardownKind::of(outcome);
    match (kind, outcome) {
        (TeardownKind::Failed, Err(err)) => {
            tracing::error!(
                connection_id = %connection_id,
                backend = %backend,
                error = %err,
                "Backend connection error"
            );
        }
        (TeardownKind::Benign, _) => {
            tracing::debug!(
                connection_id = %connection_id,
                backend = %backend,
                "Client left before the backend finished; backend leg dropped"
            );
        }
        _ => {
            tracing::trace!(connection_id = %connection_id, backend = %backend, "Backend connection closed");
        }
    }
    metrics::record_teardown(kind);
    kind
}

/// How the relay of a response body ended, as seen from the client side.
#[derive(Debug)]
enum RelayEnd {
    /// Body fully relayed, or no body will be relayed.
    Finished,
    /// Client side dropped the body before its end.
    ClientGone,
    /// Backend body failed mid-stream.
    Failed(String),
}

/// The backend response body broke off before its declared end.
#[derive(Debug, Error)]
#[error("backend response body failed: {0}")]
pub struct RelayFailed(String);

/// Reports the relay's end to the driver. Dropping it unsettled reports
/// [`RelayEnd::ClientGone`].
#[derive(Debug)]
struct RelaySignal(Option<oneshot::Sender<RelayEnd>>);

impl RelaySignal {
    fn settle(&mut self, end: RelayEnd) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(end);
        }
    }
}

impl Drop for RelaySignal {
    fn drop(&mut self) {
        self.settle(RelayEnd::ClientGone);
    }
}

type BoxError = Box<dyn StdError + Send + Sync>;

fn relay_outcome(end: Result<RelayEnd, oneshot::error::RecvError>) -> Result<(), BoxError> {
    match end {
        Ok(RelayEnd::Finished) | Err(_) => Ok(()),
        Ok(RelayEnd::ClientGone) => Err(ClientGone.into()),
        Ok(RelayEnd::Failed(detail)) => Err(RelayFailed(detail).into()),
    }
}

/// Error message with its whole source chain.
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        detail.push_str(": ");
        detail.push_str(&err.to_string());
        source = err.source();
    }
    detail
}

enum FirstDone {
    Conn(Result<(), hyper::Error>),
    Relay(Result<RelayEnd, oneshot::error::RecvError>),
}

/// An open backend connection that will carry exactly one request.
pub struct ForwardingConnection {
    id: ConnectionId,
    sender: SendRequest<Full<Bytes>>,
    relay: RelaySignal,
    closed: watch::Receiver<bool>,
}

impl ForwardingConnection {
    /// Run the HTTP/1.1 handshake over `stream` and spawn the connection driver.
    ///
    /// `guard` is held by the driver and released once the socket is gone.
    /// The driver reports the leg's end only after both the connection and
    /// the relay of its response body have finished.
    pub async fn establish<S>(
        stream: S,
        backend: String,
        guard: ConnectionGuard,
    ) -> Result<Self, ForwardError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        let (relay_tx, mut relay_rx) = oneshot::channel::<RelayEnd>();
        let (closed_tx, closed) = watch::channel(false);
        let id = guard.id();

        tokio::spawn(async move {
            let mut conn = Box::pin(conn);
            let first = tokio::select! {
                biased;
                res = &mut conn => FirstDone::Conn(res),
                end = &mut relay_rx => FirstDone::Relay(end),
            };

            let outcome = match first {
                FirstDone::Conn(Err(err)) => Err(BoxError::from(err)),
                // hyper hands body errors to the body, not the connection
                FirstDone::Conn(Ok(())) => relay_outcome(relay_rx.await),
                FirstDone::Relay(Ok(RelayEnd::Finished) | Err(_)) => {
                    (&mut conn).await.map_err(BoxError::from)
                }
                FirstDone::Relay(end) => relay_outcome(end),
            };

            match &outcome {
                Ok(()) => connection_lost(id, &backend, Ok(())),
                Err(err) => connection_lost(id, &backend, Err(&**err)),
            };

            drop(conn);
            drop(guard);
            let _ = closed_tx.send(true);
        });

        Ok(Self {
            id,
            sender,
            relay: RelaySignal(Some(relay_tx)),
            closed,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Resolves once the backend socket has been released.
    pub fn on_close(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut closed = self.closed.clone();
        async move {
            let _ = closed.wait_for(|closed| *closed).await;
        }
    }

    /// Send the request and return the backend's response head with a
    /// streaming body. Dropping the future or the body early aborts the leg.
    pub async fn forward(
        mut self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<RelayBody>, ForwardError> {
        let response = match self.sender.send_request(request).await {
            Ok(response) => response,
            Err(err) => {
                // let the driver report the connection's own failure
                self.relay.settle(RelayEnd::Finished);
                return Err(ForwardError::Http(err));
            }
        };

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(
            parts,
            RelayBody {
                inner: body,
                relay: self.relay,
            },
        ))
    }
}

/// Backend response body on its way to the client.
///
/// Frames pass through in order, unmodified.
#[derive(Debug)]
pub struct RelayBody {
    inner: Incoming,
    relay: RelaySignal,
}

impl Body for RelayBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(None) => {
                this.relay.settle(RelayEnd::Finished);
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => {
                this.relay.settle(RelayEnd::Failed(describe(&err)));
                Poll::Ready(Some(Err(err)))
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
