//! Tunnel subsystem.
//!
//! # Data Flow
//! ```text
//! Agent → /v3/connect[/register]
//!     → dispatcher.rs (404 when no capability)
//!     → server.rs (authorize, WebSocket upgrade)
//!     → session.rs (registry + per-agent duplex loop)
//!
//! Agent → /v3/connect/config
//!     → dispatcher.rs
//!     → authorizer.rs (401 unless approved)
//!     → node_config.rs (JSON document)
//! ```
//!
//! # Design Decisions
//! - Capability presence is decided once at bootstrap; never re-probed
//! - One session per client key; a reconnect replaces the old session
//! - Shutdown closes every session with a Close frame

pub mod authorizer;
pub mod dispatcher;
pub mod node_config;
pub mod server;
pub mod session;

pub use authorizer::{AgentIdentity, TokenTunnelAuthorizer, TunnelAuthorizer};
pub use dispatcher::connect_handlers;
pub use node_config::{NodeConfigProvider, StaticNodeConfig};
pub use server::{TunnelServer, WebSocketTunnelServer};
pub use session::{InboundFrame, SessionHandle, SessionRegistry};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use thiserror::Error;

use crate::lifecycle::shutdown::Shutdown;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("invalid tunnel parameters: {0}")]
    InvalidParams(String),

    #[error("tunnel agent not authorized")]
    Unauthorized,

    #[error("tunnel session {0} is closed")]
    SessionClosed(String),

    #[error("node config unavailable: {0}")]
    Config(String),
}

impl TunnelError {
    pub fn status(&self) -> StatusCode {
        match self {
            TunnelError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            TunnelError::Unauthorized => StatusCode::UNAUTHORIZED,
            TunnelError::SessionClosed(_) => StatusCode::GONE,
            TunnelError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TunnelError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Runtime-detected tunnel support: an acceptor plus the check that guards it.
#[derive(Clone)]
pub struct TunnelCapability {
    pub server: Arc<dyn TunnelServer>,
    pub authorizer: Arc<dyn TunnelAuthorizer>,
}

impl TunnelCapability {
    pub fn new(server: Arc<dyn TunnelServer>, authorizer: Arc<dyn TunnelAuthorizer>) -> Self {
        Self { server, authorizer }
    }

    /// WebSocket acceptor backed by `sessions`.
    pub fn websocket(
        authorizer: Arc<dyn TunnelAuthorizer>,
        sessions: SessionRegistry,
        shutdown: Shutdown,
    ) -> Self {
        let server = WebSocketTunnelServer::new(authorizer.clone(), sessions, shutdown);
        Self::new(Arc::new(server), authorizer)
    }
}
