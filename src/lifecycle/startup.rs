//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the single-threaded event loop
//! - Define the errors that stop the process before any listener opens
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;

use thiserror::Error;
use tokio::runtime::{Builder, Runtime};

use crate::config::{ConfigError, ServerConfig};
use crate::net::TlsError;

/// Why the server could not start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Blocking threads kept free for the runtime's own work (DNS lookups for
/// backend legs, static file reads) on top of the application pool.
pub const RUNTIME_BLOCKING_HEADROOM: usize = 64;

/// The shared event loop: one thread for all network I/O, plus blocking
/// threads for application work and runtime internals.
///
/// The application's share is capped by its [`BlockingPool`], so a saturated
/// pool still leaves [`RUNTIME_BLOCKING_HEADROOM`] threads to everything else.
///
/// [`BlockingPool`]: crate::lifecycle::BlockingPool
pub fn build_runtime(server: &ServerConfig) -> std::io::Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(server.worker_threads.max(1) + RUNTIME_BLOCKING_HEADROOM)
        .thread_name("frontdoor")
        .build()
}
