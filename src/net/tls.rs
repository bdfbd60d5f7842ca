//! TLS configuration and certificate loading.

use axum_server::tls_rustls::RustlsConfig;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

use crate::config::TlsConfig;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("{what} file not found: {path}")]
    Missing { what: &'static str, path: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates in {0}")]
    NoCertificates(String),

    #[error("no private key in {0}")]
    NoPrivateKey(String),
}

/// Check that the PEM files hold a certificate chain and a key, then load them.
pub async fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let cert_path = config.cert_path.as_path();
    let key_path = config.key_path.as_path();

    let certs = {
        let mut reader = open(cert_path, "Certificate")?;
        rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| read_error(cert_path, source))?
    };
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.display().to_string()));
    }

    let key = {
        let mut reader = open(key_path, "Private key")?;
        rustls_pemfile::private_key(&mut reader).map_err(|source| read_error(key_path, source))?
    };
    if key.is_none() {
        return Err(TlsError::NoPrivateKey(key_path.display().to_string()));
    }

    tracing::info!(
        cert = %cert_path.display(),
        chain_len = certs.len(),
        "TLS certificate loaded"
    );
    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|source| read_error(cert_path, source))
}

fn open(path: &Path, what: &'static str) -> Result<BufReader<File>, TlsError> {
    if !path.exists() {
        return Err(TlsError::Missing {
            what,
            path: path.display().to_string(),
        });
    }
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| read_error(path, source))
}

fn read_error(path: &Path, source: std::io::Error) -> TlsError {
    TlsError::Read {
        path: path.display().to_string(),
        source,
    }
}
