//! HTTP surfaces of the front door.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum router, request ID, tracing)
//!     → /_ui/*  → static files (ServeDir)
//!     → /_api/* → application.rs (handler on the blocking pool)
//!     → /*      → proxy root (request.rs prepares, response.rs relays)
//!     → Send to client
//!
//! WebSocket port
//!     → websocket.rs (upgrade, hand to the broadcast handler)
//! ```

pub mod application;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use application::{Application, ApplicationBridge, InfoApplication};
pub use request::{RequestIdGenerator, X_REQUEST_ID};
pub use server::ServerAssembler;
pub use websocket::{BroadcastHandler, BroadcastHub, WebSocketServer};
