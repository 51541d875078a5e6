//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → FrontdoorConfig (validated, immutable)
//!     → passed by reference / Arc to the assembler and connection factory
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - TLS material presence is checked at startup, not here

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BackendConfig, FrontdoorConfig, ObservabilityConfig, ServerConfig, TimeoutConfig, TlsConfig,
};
pub use validation::ValidationError;
