//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::observability::audit::AuditLevel;

/// Root configuration for the front door.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind addresses, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Token service stand-in.
    pub auth: AuthConfig,

    /// Audit log for gated requests.
    pub audit: AuditConfig,

    /// Agent tunnel support.
    pub tunnel: TunnelConfig,

    /// Base URLs of the collaborator services.
    pub upstreams: UpstreamsConfig,

    /// UI static content.
    pub ui: UiConfig,

    /// Generic proxy allow-list.
    pub proxy: AllowListConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plaintext bind address (e.g., "0.0.0.0:8080").
    pub http_address: String,

    /// TLS bind address, used only when `tls` is set.
    pub https_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http_address: "0.0.0.0:8080".to_string(),
            https_address: "0.0.0.0:8443".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the secure listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Maximum time to wait for in-flight requests on shutdown.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenConfig>,
}

/// A static API token. Clients present it as `<name>:<secret>`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenConfig {
    pub name: String,
    pub secret: String,
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuditConfig {
    /// 0 off, 1 metadata, 2 metadata and request body.
    pub level: AuditLevel,

    /// Append-only JSON lines file; stdout when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Whether the tunnel capability is offered at all.
    pub enabled: bool,

    pub registration_tokens: Vec<TunnelTokenConfig>,

    /// Server URL handed to agents in their node config.
    pub server_url: String,

    /// CA checksum handed to agents in their node config.
    pub ca_checksum: String,

    /// How long shutdown waits for tunnel sessions to close.
    pub drain_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            registration_tokens: Vec::new(),
            server_url: String::new(),
            ca_checksum: String::new(),
            drain_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TunnelTokenConfig {
    pub token: String,
    pub cluster: String,
}

/// Collaborator base URLs. Unset collaborators answer 503.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamsConfig {
    pub management: Option<String>,
    pub public_api: Option<String>,
    /// Falls back to `management` when unset.
    pub token_api: Option<String>,
    /// Falls back to `management` when unset.
    pub cluster_import: Option<String>,
    pub saml: Option<String>,
    pub webhooks: Option<String>,
    pub cluster_proxy: Option<String>,
    pub telemetry: Option<String>,
    pub capabilities: Option<String>,
}

impl UpstreamsConfig {
    /// Every configured upstream with its name.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("management", &self.management),
            ("public_api", &self.public_api),
            ("token_api", &self.token_api),
            ("cluster_import", &self.cluster_import),
            ("saml", &self.saml),
            ("webhooks", &self.webhooks),
            ("cluster_proxy", &self.cluster_proxy),
            ("telemetry", &self.telemetry),
            ("capabilities", &self.capabilities),
        ]
        .into_iter()
        .filter_map(|(name, url)| url.as_deref().map(|url| (name, url)))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UiConfig {
    /// Directory holding the built UI; UI paths 404 when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AllowListConfig {
    /// Exact host names or `*.suffix` wildcards.
    pub allowed_hosts: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: RouterConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.http_address, "0.0.0.0:8080");
        assert_eq!(config.audit.level, AuditLevel::Off);
        assert!(!config.tunnel.enabled);
        assert_eq!(config.upstreams.iter().count(), 0);
    }

    #[test]
    fn test_full_config_parses() {
        let config: RouterConfig = toml::from_str(
            r#"
            [listener]
            http_address = "127.0.0.1:80"

            [listener.tls]
            cert_path = "/etc/front-door/tls.crt"
            key_path = "/etc/front-door/tls.key"

            [[auth.tokens]]
            name = "token-abc"
            secret = "s3cret"
            user_id = "u-1"
            username = "admin"
            groups = ["admins"]
            expires_at = "2030-01-01T00:00:00Z"

            [audit]
            level = 2
            path = "/var/log/audit.log"

            [tunnel]
            enabled = true
            registration_tokens = [{ token = "reg", cluster = "c-1" }]

            [upstreams]
            management = "http://127.0.0.1:9000"

            [proxy]
            allowed_hosts = ["*.amazonaws.com"]
            "#,
        )
        .unwrap();

        assert!(config.listener.tls.is_some());
        assert!(config.auth.tokens[0].enabled);
        assert!(config.auth.tokens[0].expires_at.is_some());
        assert_eq!(config.audit.level, AuditLevel::RequestBody);
        assert_eq!(config.tunnel.registration_tokens[0].cluster, "c-1");
        assert_eq!(
            config.upstreams.iter().collect::<Vec<_>>(),
            vec![("management", "http://127.0.0.1:9000")]
        );
    }

    #[test]
    fn test_bad_audit_level_rejected() {
        assert!(toml::from_str::<RouterConfig>("[audit]\nlevel = 7").is_err());
    }
}
