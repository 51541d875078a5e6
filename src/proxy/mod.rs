//! Reverse proxy to the document-store backend.
//!
//! # Data Flow
//! ```text
//! request path /a/b/c
//!     → node.rs (root.resolve: child_for("a") → child_for("b") → child_for("c"))
//!     → factory.rs (open leg: TCP, then TLS if the node says so)
//!     → connection.rs (one request, streamed response, filtered teardown)
//!     → response relayed to the client
//! ```
//!
//! # Design Decisions
//! - One backend connection per request, closed after the response
//! - Backend TLS flag fixed at the root and copied to every child
//! - Host and port never change below the root

pub mod connection;
pub mod error;
pub mod factory;
pub mod node;
pub mod target;

pub use connection::{
    connection_lost, ForwardingConnection, RelayBody, TeardownKind, BENIGN_TEARDOWN_SIGNATURE,
};
pub use error::ForwardError;
pub use factory::{BackendStream, ForwardingConnectionFactory};
pub use node::ProxyNode;
pub use target::BackendTarget;
