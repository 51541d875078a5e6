//! Front door for a document-store backed server.
//!
//! One bind address exposes a reverse proxy to the backend (optionally
//! TLS-wrapped independently of the client side), static assets under
//! `/_ui`, an application API under `/_api`, and a WebSocket push channel on
//! its own port.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;

pub use config::schema::FrontdoorConfig;
pub use http::ServerAssembler;
pub use lifecycle::Shutdown;
