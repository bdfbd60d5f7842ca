//! Tunnel connection acceptor.

use axum::{
    body::Body,
    extract::{FromRequestParts, WebSocketUpgrade},
    http::Request,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use std::sync::Arc;

use crate::lifecycle::shutdown::Shutdown;
use crate::tunnel::{SessionRegistry, TunnelAuthorizer, TunnelError};

/// Accepts agent connections on `/v3/connect` and `/v3/connect/register`.
pub trait TunnelServer: Send + Sync {
    fn serve(&self, request: Request<Body>) -> BoxFuture<'_, Response>;
}

/// Authorizes the agent, then upgrades to a WebSocket session.
pub struct WebSocketTunnelServer {
    authorizer: Arc<dyn TunnelAuthorizer>,
    sessions: SessionRegistry,
    shutdown: Shutdown,
}

impl WebSocketTunnelServer {
    pub fn new(
        authorizer: Arc<dyn TunnelAuthorizer>,
        sessions: SessionRegistry,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            authorizer,
            sessions,
            shutdown,
        }
    }
}

impl TunnelServer for WebSocketTunnelServer {
    fn serve(&self, request: Request<Body>) -> BoxFuture<'_, Response> {
        Box::pin(async move {
            let (mut parts, _body) = request.into_parts();

            let agent = match self.authorizer.authorize(&parts).await {
                Ok(Some(agent)) => agent,
                Ok(None) => {
                    tracing::debug!(path = %parts.uri.path(), "Rejected tunnel connection");
                    return TunnelError::Unauthorized.into_response();
                }
                Err(e) => return e.into_response(),
            };

            let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
                Ok(upgrade) => upgrade,
                Err(rejection) => return rejection.into_response(),
            };

            tracing::debug!(
                client_key = %agent.client_key,
                register = agent.register,
                "Upgrading tunnel connection"
            );
            let sessions = self.sessions.clone();
            let shutdown = self.shutdown.clone();
            upgrade
                .on_failed_upgrade(|e| tracing::warn!(error = %e, "Tunnel upgrade failed"))
                .on_upgrade(move |socket| sessions.run(socket, agent, shutdown))
        })
    }
}
