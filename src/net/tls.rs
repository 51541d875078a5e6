//! TLS policy and certificate loading.
//!
//! The same credential set serves both directions: the public listener
//! presents `certificate`/`keyfile`, and the backend leg trusts
//! `backend_certificate` (falling back to `certificate`) as its only root.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use thiserror::Error;

use crate::config::TlsConfig;

/// Errors raised while preparing TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("{direction} TLS requested but SSL certificates are not configured (missing {missing})")]
    MissingMaterial {
        direction: &'static str,
        missing: &'static str,
    },

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificate found in {0:?}")]
    NoCertificate(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("rustls rejected the configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Which legs of a proxied exchange are encrypted, and with what.
///
/// Read-only after startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsPolicy {
    pub client_facing: bool,
    pub backend_facing: bool,
    pub certificate: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub backend_certificate: Option<PathBuf>,
}

impl TlsPolicy {
    /// Build the policy from the `[tls]` section. Empty paths count as unset.
    pub fn from_config(config: &TlsConfig) -> Self {
        let path = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        };

        let certificate = path(&config.certificate);
        Self {
            client_facing: config.client_facing,
            backend_facing: config.backend_facing,
            backend_certificate: path(&config.backend_certificate).or_else(|| certificate.clone()),
            certificate,
            private_key: path(&config.keyfile),
        }
    }

    /// Check that every enabled direction has its key and certificate.
    pub fn require_material(&self) -> Result<(), TlsError> {
        for (enabled, direction) in [
            (self.backend_facing, "backend-facing"),
            (self.client_facing, "client-facing"),
        ] {
            if !enabled {
                continue;
            }
            if self.private_key.is_none() {
                return Err(TlsError::MissingMaterial {
                    direction,
                    missing: "keyfile",
                });
            }
            if self.certificate.is_none() {
                return Err(TlsError::MissingMaterial {
                    direction,
                    missing: "certificate",
                });
            }
        }
        Ok(())
    }

    /// Certificate the backend must present, if backend TLS is usable.
    pub fn backend_trust_anchor(&self) -> Option<&Path> {
        self.backend_certificate.as_deref()
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Read every certificate from a PEM file.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

/// Read the first private key from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

/// Server-side configuration for the public listener.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    let certs = load_certificates(cert_path)?;
    let key = load_private_key(key_path)?;

    let mut config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(RustlsConfig::from_config(Arc::new(config)))
}

/// Client-side configuration for the backend leg.
///
/// The root store holds only the configured backend certificate, so the
/// backend must present exactly that identity.
pub fn backend_client_config(trust_anchor: &Path) -> Result<ClientConfig, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certificates(trust_anchor)? {
        roots.add(cert)?;
    }

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}
