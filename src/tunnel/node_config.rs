//! Node configuration served to approved agents on `/v3/connect/config`.

use futures_util::future::{self, BoxFuture};
use serde_json::{json, Value};

use crate::tunnel::{AgentIdentity, TunnelError};

pub trait NodeConfigProvider: Send + Sync {
    /// `Ok(None)` means there is nothing to serve for this agent (404).
    fn node_config<'a>(
        &'a self,
        agent: &'a AgentIdentity,
    ) -> BoxFuture<'a, Result<Option<Value>, TunnelError>>;
}

/// Fixed server URL and CA checksum for every agent.
pub struct StaticNodeConfig {
    server_url: String,
    ca_checksum: String,
}

impl StaticNodeConfig {
    pub fn new(server_url: impl Into<String>, ca_checksum: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ca_checksum: ca_checksum.into(),
        }
    }
}

impl NodeConfigProvider for StaticNodeConfig {
    fn node_config<'a>(
        &'a self,
        agent: &'a AgentIdentity,
    ) -> BoxFuture<'a, Result<Option<Value>, TunnelError>> {
        let doc = json!({
            "serverUrl": self.server_url,
            "caChecksum": self.ca_checksum,
            "cluster": agent.cluster,
            "node": agent.node,
        });
        Box::pin(future::ready(Ok(Some(doc))))
    }
}
