//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Public side:
//!     tls.rs (optional rustls server config)
//!     → primary HTTP(S) listener (axum / axum-server)
//!
//! Push channel:
//!     listener.rs (accept loop, connection limits)
//!     → WebSocket handshake
//!
//! Backend side:
//!     tls.rs (client config trusting the backend certificate)
//!     → connection.rs (per-leg identity and tracking)
//! ```

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use tls::{TlsError, TlsPolicy};
