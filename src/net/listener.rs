//! Listener binding and serving.
//!
//! # Responsibilities
//! - Bind the plaintext TCP listener
//! - Serve the router on plaintext and TLS listeners
//! - Stop accepting on shutdown and let in-flight requests finish
//!
//! # Design Decisions
//! - Both listeners serve the same router
//! - Peer addresses are exposed to handlers through `ConnectInfo`
//! - A shutdown triggered before serving starts stops the listener at once

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::lifecycle::shutdown::Shutdown;

/// Address and certificate for the TLS listener.
#[derive(Clone)]
pub struct SecureListener {
    pub addr: SocketAddr,
    pub tls: RustlsConfig,
}

/// Bind the plaintext listener.
pub async fn bind(addr: &str) -> io::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Listener bound");
    Ok(listener)
}

pub async fn serve_plaintext(
    listener: TcpListener,
    app: Router,
    shutdown: Shutdown,
) -> io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP listener serving");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown.triggered().await;
            tracing::info!(address = %addr, "HTTP listener draining");
        })
        .await
}

pub async fn serve_tls(
    secure: SecureListener,
    app: Router,
    shutdown: Shutdown,
    grace: Duration,
) -> io::Result<()> {
    let handle = Handle::new();
    let signal = handle.clone();
    let addr = secure.addr;
    tokio::spawn(async move {
        shutdown.triggered().await;
        tracing::info!(address = %addr, "HTTPS listener draining");
        signal.graceful_shutdown(Some(grace));
    });

    tracing::info!(address = %addr, "HTTPS listener serving");
    axum_server::bind_rustls(secure.addr, secure.tls)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
}
