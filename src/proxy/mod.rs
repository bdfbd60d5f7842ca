//! Collaborator proxies.
//!
//! # Data Flow
//! ```text
//! Gated or public branch
//!     → upstream.rs (configured internal service, hyper-util client)
//!     → allowlist.rs (/meta/proxy to allow-listed external hosts, reqwest)
//! ```
//!
//! # Design Decisions
//! - Upstream failures map to 502, missing configuration to 503
//! - No retries at this layer
//! - Client identity headers are only forwarded when the gate set them

pub mod allowlist;
pub mod upstream;

pub use allowlist::{AllowList, AllowListProxy};
pub use upstream::{ForwardedProto, UpstreamProxy};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("invalid proxy destination: {0}")]
    InvalidDestination(String),

    #[error("host {0} is not on the proxy allow-list")]
    HostNotAllowed(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::InvalidDestination(_) => StatusCode::BAD_REQUEST,
            ProxyError::HostNotAllowed(_) => StatusCode::FORBIDDEN,
            ProxyError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
