//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the front door.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the front door.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FrontdoorConfig {
    /// Public listeners (bind address, ports, static assets, worker pool).
    pub server: ServerConfig,

    /// Shared TLS credential set and the two independent TLS switches.
    pub tls: TlsConfig,

    /// Internal document-store backend.
    pub backend: BackendConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Public listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface address shared by every listener (e.g., "127.0.0.1").
    pub bind_address: String,

    /// Plain HTTP port.
    pub port: u16,

    /// HTTPS port, used instead of `port` when client-facing TLS is on.
    pub tls_port: u16,

    /// Port of the WebSocket push channel.
    pub websocket_port: u16,

    /// Maximum concurrent WebSocket connections (backpressure).
    pub max_websocket_connections: usize,

    /// Directory served under `/_ui`.
    pub static_dir: PathBuf,

    /// Size of the blocking pool running the application handler.
    pub worker_threads: usize,

    /// Largest request body accepted for proxying or the application.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Port of the primary listener for the given client-facing TLS setting.
    pub fn listen_port(&self, client_tls: bool) -> u16 {
        if client_tls {
            self.tls_port
        } else {
            self.port
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5985,
            tls_port: 6985,
            websocket_port: 9000,
            max_websocket_connections: 1_024,
            static_dir: PathBuf::from("www"),
            worker_threads: 10,
            max_body_bytes: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// TLS configuration.
///
/// `client_facing` and `backend_facing` are independent: any combination is
/// valid. Both draw on the same key and certificate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    /// Terminate TLS on the public listener.
    pub client_facing: bool,

    /// Speak TLS to the document-store backend.
    pub backend_facing: bool,

    /// Path to certificate file (PEM).
    pub certificate: Option<String>,

    /// Path to private key file (PEM).
    pub keyfile: Option<String>,

    /// Certificate the backend must present (PEM). Defaults to `certificate`.
    pub backend_certificate: Option<String>,
}

/// Document-store backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend host name or address.
    pub host: String,

    /// Plain HTTP port.
    pub port: u16,

    /// HTTPS port, used instead of `port` when backend-facing TLS is on.
    pub ssl_port: u16,
}

impl BackendConfig {
    /// Backend port for the given backend-facing TLS setting.
    pub fn port_for(&self, backend_tls: bool) -> u16 {
        if backend_tls {
            self.ssl_port
        } else {
            self.port
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5984,
            ssl_port: 6984,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment (TCP + TLS) timeout in seconds.
    pub connect_secs: u64,

    /// Grace period for in-flight requests on shutdown, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            shutdown_grace_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
