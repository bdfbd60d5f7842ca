//! Tunnel agent authorization.
//!
//! Agents present a cluster registration token in `X-API-Tunnel-Token`.
//! `X-API-Tunnel-Params` optionally carries `{"nodeName": "..."}` so that
//! node agents get a distinct client key from the cluster agent.

use axum::http::request::Parts;
use futures_util::future::{self, BoxFuture};
use serde::Deserialize;
use std::collections::HashMap;

use crate::config::TunnelTokenConfig;
use crate::tunnel::TunnelError;

pub const TUNNEL_TOKEN_HEADER: &str = "x-api-tunnel-token";
pub const TUNNEL_PARAMS_HEADER: &str = "x-api-tunnel-params";

/// Who is on the other end of a tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub client_key: String,
    pub cluster: String,
    pub node: Option<String>,
    /// Set for `/register`, the first connection of a new agent.
    pub register: bool,
}

/// Decides whether a request comes from an approved agent.
///
/// `Ok(None)` means the request is not from a known agent (401).
pub trait TunnelAuthorizer: Send + Sync {
    fn authorize<'a>(
        &'a self,
        parts: &'a Parts,
    ) -> BoxFuture<'a, Result<Option<AgentIdentity>, TunnelError>>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentParams {
    node_name: Option<String>,
}

/// Registration tokens mapped to the cluster they belong to.
pub struct TokenTunnelAuthorizer {
    tokens: HashMap<String, String>,
}

impl TokenTunnelAuthorizer {
    pub fn from_config(tokens: &[TunnelTokenConfig]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|t| (t.token.clone(), t.cluster.clone()))
                .collect(),
        }
    }

    fn check(&self, parts: &Parts) -> Result<Option<AgentIdentity>, TunnelError> {
        let Some(token) = parts
            .headers
            .get(TUNNEL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(None);
        };
        let Some(cluster) = self.tokens.get(token) else {
            tracing::debug!(path = %parts.uri.path(), "Unknown tunnel registration token");
            return Ok(None);
        };

        let params = match parts.headers.get(TUNNEL_PARAMS_HEADER) {
            Some(raw) => serde_json::from_slice::<AgentParams>(raw.as_bytes())
                .map_err(|e| TunnelError::InvalidParams(e.to_string()))?,
            None => AgentParams::default(),
        };
        let node = params.node_name.filter(|n| !n.is_empty());
        let client_key = match &node {
            Some(node) => format!("{cluster}:{node}"),
            None => cluster.clone(),
        };

        Ok(Some(AgentIdentity {
            client_key,
            cluster: cluster.clone(),
            node,
            register: parts.uri.path().ends_with("/register"),
        }))
    }
}

impl TunnelAuthorizer for TokenTunnelAuthorizer {
    fn authorize<'a>(
        &'a self,
        parts: &'a Parts,
    ) -> BoxFuture<'a, Result<Option<AgentIdentity>, TunnelError>> {
        Box::pin(future::ready(self.check(parts)))
    }
}
