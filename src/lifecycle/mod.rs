//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build runtime → Assemble server → Start listeners
//!
//! Work (executor.rs):
//!     Event loop → BlockingPool → application handler → back on the loop
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → Shutdown broadcast → Stop accepting → Drain → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then TLS material, then listeners
//! - Shutdown has a grace period: forced exit after the deadline

pub mod executor;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use executor::{BlockingPool, ExecutorError};
pub use shutdown::Shutdown;
pub use startup::{build_runtime, StartupError};
