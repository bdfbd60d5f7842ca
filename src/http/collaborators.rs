//! The capabilities the router dispatches to.
//!
//! Every branch of the route table ends in one of these. They are resolved
//! once at bootstrap; a failure here is fatal and no listener is opened.

use std::sync::Arc;

use crate::config::RouterConfig;
use crate::http::server::ServerError;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::audit::AuditLog;
use crate::proxy::upstream::{self, http_client};
use crate::proxy::{AllowList, AllowListProxy};
use crate::routing::handler::{self, Handler};
use crate::security::{Authenticator, TokenAuthenticator};
use crate::tunnel::{
    NodeConfigProvider, SessionRegistry, StaticNodeConfig, TokenTunnelAuthorizer, TunnelCapability,
};
use crate::ui;

/// Mount point of the allow-listed generic proxy.
pub const META_PROXY_PREFIX: &str = "/meta/proxy";

pub struct Collaborators {
    pub authenticator: Arc<dyn Authenticator>,
    pub audit: Arc<AuditLog>,
    pub management_api: Handler,
    pub public_api: Handler,
    pub token_api: Handler,
    pub cluster_import: Handler,
    pub saml: Handler,
    pub webhooks: Handler,
    pub cluster_proxy: Handler,
    pub telemetry_proxy: Handler,
    pub cloud_capabilities: Handler,
    pub meta_proxy: Handler,
    pub ui_content: Handler,
    pub tunnel: Option<TunnelCapability>,
    pub node_config: Arc<dyn NodeConfigProvider>,
    pub sessions: SessionRegistry,
    pub allow_list: Arc<AllowList>,
}

impl Collaborators {
    /// Everything answers 503 except the gate; callers replace what they need.
    pub fn unconfigured(authenticator: Arc<dyn Authenticator>, audit: Arc<AuditLog>) -> Self {
        Self {
            authenticator,
            audit,
            management_api: upstream::unavailable("management"),
            public_api: upstream::unavailable("public_api"),
            token_api: upstream::unavailable("token_api"),
            cluster_import: upstream::unavailable("cluster_import"),
            saml: upstream::unavailable("saml"),
            webhooks: upstream::unavailable("webhooks"),
            cluster_proxy: upstream::unavailable("cluster_proxy"),
            telemetry_proxy: upstream::unavailable("telemetry"),
            cloud_capabilities: upstream::unavailable("capabilities"),
            meta_proxy: upstream::unavailable("meta_proxy"),
            ui_content: handler::not_found(),
            tunnel: None,
            node_config: Arc::new(StaticNodeConfig::new("", "")),
            sessions: SessionRegistry::new(),
            allow_list: Arc::new(AllowList::default()),
        }
    }

    pub fn from_config(config: &RouterConfig, shutdown: &Shutdown) -> Result<Self, ServerError> {
        let authenticator = TokenAuthenticator::from_config(&config.auth.tokens);
        if authenticator.is_empty() {
            tracing::warn!("No auth tokens configured, every gated request will be rejected");
        }

        let audit = AuditLog::open(config.audit.level, config.audit.path.as_deref())
            .map_err(|e| init_error("audit", e))?;

        let upstreams = &config.upstreams;
        let client = http_client();
        let proxy = |name: &'static str, url: Option<&String>| {
            upstream::upstream_or_unavailable(name, url.map(String::as_str), &client)
                .map_err(|e| init_error(name, e))
        };
        let management = upstreams.management.as_ref();

        let allow_list = Arc::new(AllowList::new(config.proxy.allowed_hosts.clone()));
        let meta_proxy = AllowListProxy::new(allow_list.clone(), META_PROXY_PREFIX)
            .map_err(|e| init_error("meta_proxy", e))?
            .into_handler();

        let ui_content = ui::content(config.ui.path.as_deref()).map_err(|e| init_error("ui", e))?;

        let sessions = SessionRegistry::new();
        let tunnel = config.tunnel.enabled.then(|| {
            let authorizer = TokenTunnelAuthorizer::from_config(&config.tunnel.registration_tokens);
            tracing::info!(
                tokens = config.tunnel.registration_tokens.len(),
                "Tunnel capability enabled"
            );
            TunnelCapability::websocket(Arc::new(authorizer), sessions.clone(), shutdown.clone())
        });

        Ok(Self {
            authenticator: Arc::new(authenticator),
            audit: Arc::new(audit),
            management_api: proxy("management", management)?,
            public_api: proxy("public_api", upstreams.public_api.as_ref())?,
            token_api: proxy("token_api", upstreams.token_api.as_ref().or(management))?,
            cluster_import: proxy("cluster_import", upstreams.cluster_import.as_ref().or(management))?,
            saml: proxy("saml", upstreams.saml.as_ref())?,
            webhooks: proxy("webhooks", upstreams.webhooks.as_ref())?,
            cluster_proxy: proxy("cluster_proxy", upstreams.cluster_proxy.as_ref())?,
            telemetry_proxy: proxy("telemetry", upstreams.telemetry.as_ref())?,
            cloud_capabilities: proxy("capabilities", upstreams.capabilities.as_ref())?,
            meta_proxy,
            ui_content,
            tunnel,
            node_config: Arc::new(StaticNodeConfig::new(
                config.tunnel.server_url.clone(),
                config.tunnel.ca_checksum.clone(),
            )),
            sessions,
            allow_list,
        })
    }
}

fn init_error(collaborator: &'static str, err: impl std::fmt::Display) -> ServerError {
    ServerError::CollaboratorInit {
        collaborator,
        reason: err.to_string(),
    }
}
