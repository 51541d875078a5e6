//! WebSocket push channel.
//!
//! # Responsibilities
//! - Accept sockets on the dedicated WebSocket port
//! - Complete the upgrade handshake with each client
//! - Hand every upgraded stream to the [`BroadcastHandler`]
//!
//! # Data Flow
//! ```text
//! Client ──frame──→ BroadcastHub ──frame──→ every connected client
//! ```
//!
//! # Design Decisions
//! - Separate listener from the HTTP surfaces, same bind address
//! - Connection count bounded by the listener's permits
//! - A failed handshake only affects the socket concerned

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::net::{ConnectionTracker, Listener, ListenerError};

/// Receives each accepted WebSocket client.
pub trait BroadcastHandler: Send + Sync + 'static {
    /// Serve `stream` until the client goes away.
    fn serve(&self, stream: WebSocketStream<TcpStream>, peer: SocketAddr) -> BoxFuture<'static, ()>;
}

/// Relays every text or binary message to all connected clients.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<Message>,
    clients: ConnectionTracker,
}

impl BroadcastHub {
    /// `capacity` is how many messages a slow client may fall behind
    /// before it starts skipping.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            clients: ConnectionTracker::new(),
        }
    }

    pub fn connected(&self) -> u64 {
        self.clients.active_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl BroadcastHandler for BroadcastHub {
    fn serve(&self, stream: WebSocketStream<TcpStream>, peer: SocketAddr) -> BoxFuture<'static, ()> {
        let tx = self.tx.clone();
        let mut rx = self.tx.subscribe();
        let guard = self.clients.track();

        Box::pin(async move {
            let (mut sink, mut source) = stream.split();
            tracing::debug!(connection_id = %guard.id(), peer = %peer, "WebSocket client joined");

            loop {
                tokio::select! {
                    incoming = source.next() => match incoming {
                        Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                            let _ = tx.send(message);
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::debug!(connection_id = %guard.id(), error = %err, "WebSocket read failed");
                            break;
                        }
                    },
                    outgoing = rx.recv() => match outgoing {
                        Ok(message) => {
                            if let Err(err) = sink.send(message).await {
                                tracing::debug!(connection_id = %guard.id(), error = %err, "WebSocket write failed");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(connection_id = %guard.id(), skipped, "WebSocket client lagging");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }

            let _ = sink.close().await;
            tracing::debug!(connection_id = %guard.id(), peer = %peer, "WebSocket client left");
        })
    }
}

/// Accept loop for the WebSocket port.
pub struct WebSocketServer {
    listener: Listener,
    handler: Arc<dyn BroadcastHandler>,
}

impl WebSocketServer {
    pub fn new(listener: Listener, handler: Arc<dyn BroadcastHandler>) -> Self {
        Self { listener, handler }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send) {
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer, permit) = match accepted {
                Ok(accepted) => accepted,
                Err(ListenerError::Closed) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "WebSocket accept failed");
                    continue;
                }
            };

            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let _permit = permit;
                match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => handler.serve(ws, peer).await,
                    Err(err) => {
                        tracing::debug!(peer = %peer, error = %err, "WebSocket handshake failed");
                    }
                }
            });
        }

        tracing::info!("WebSocket listener stopped");
    }
}
