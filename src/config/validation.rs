//! Configuration validation.
//!
//! Serde handles the syntax; this checks values the listeners depend on.
//! All errors are collected, not just the first one. TLS material is left to
//! startup, which treats its absence as fatal.

use std::net::IpAddr;
use thiserror::Error;

use crate::config::schema::FrontdoorConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("bind address {0:?} is not an IP address")]
    BindAddress(String),

    #[error("{0} must not be 0")]
    ZeroPort(&'static str),

    #[error("websocket_port {0} collides with the HTTP listener port")]
    PortCollision(u16),

    #[error("backend host must not be empty")]
    EmptyBackendHost,

    #[error("worker_threads must be at least 1")]
    NoWorkers,

    #[error("max_websocket_connections must be at least 1")]
    NoWebSocketSlots,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &FrontdoorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    if server.bind_address.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::BindAddress(server.bind_address.clone()));
    }

    let ports = [
        ("server.port", server.port),
        ("server.tls_port", server.tls_port),
        ("server.websocket_port", server.websocket_port),
        ("backend.port", config.backend.port),
        ("backend.ssl_port", config.backend.ssl_port),
    ];
    for (name, port) in ports {
        if port == 0 {
            errors.push(ValidationError::ZeroPort(name));
        }
    }

    let listen_port = server.listen_port(config.tls.client_facing);
    if listen_port != 0 && server.websocket_port == listen_port {
        errors.push(ValidationError::PortCollision(server.websocket_port));
    }

    if config.backend.host.trim().is_empty() {
        errors.push(ValidationError::EmptyBackendHost);
    }
    if server.worker_threads == 0 {
        errors.push(ValidationError::NoWorkers);
    }
    if server.max_websocket_connections == 0 {
        errors.push(ValidationError::NoWebSocketSlots);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
