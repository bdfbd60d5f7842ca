//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve every collaborator from configuration
//! - Load TLS material and bind listeners
//! - Start the config watcher for hot-reloadable settings
//! - Hand the assembled router to the HTTP server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and no listener is opened
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;

use crate::config::watcher::{apply_reloads, ConfigWatcher};
use crate::config::RouterConfig;
use crate::http::{Collaborators, HttpServer, ServerError};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::listener::{self, SecureListener};
use crate::net::tls::load_tls_config;

/// Build the server from `config` and serve until `shutdown` fires.
///
/// When `config_path` is given, changes to that file are applied to the
/// settings that support hot reload.
pub async fn start(
    config: RouterConfig,
    config_path: Option<&Path>,
    shutdown: &Shutdown,
) -> Result<(), ServerError> {
    let collaborators = Collaborators::from_config(&config, shutdown)?;
    for (name, url) in config.upstreams.iter() {
        tracing::info!(upstream = name, url = url, "Upstream configured");
    }

    let secure = match &config.listener.tls {
        Some(tls) => {
            let addr: SocketAddr = config
                .listener
                .https_address
                .parse()
                .map_err(|e| ServerError::Bind {
                    addr: config.listener.https_address.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
                })?;
            Some(SecureListener {
                addr,
                tls: load_tls_config(tls).await?,
            })
        }
        None => None,
    };

    let plaintext = listener::bind(&config.listener.http_address)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.listener.http_address.clone(),
            source,
        })?;

    // The watcher stops when dropped, so it lives until the server returns.
    let _watcher = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            tokio::spawn(apply_reloads(updates, collaborators.allow_list.clone()));
            match watcher.run() {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let audit = collaborators.audit.clone();
    let server = HttpServer::new(config, collaborators);
    let outcome = server.run(plaintext, secure, shutdown).await;
    audit.flush().await;
    outcome
}
