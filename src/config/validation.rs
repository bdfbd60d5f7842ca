//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and value ranges
//! - Detect duplicate or malformed token names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::RouterConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },

    #[error("auth token {0:?} is defined more than once")]
    DuplicateToken(String),

    #[error("auth token {0:?}: name must be non-empty and must not contain ':'")]
    InvalidTokenName(String),

    #[error("auth token {0:?} has an empty secret")]
    EmptySecret(String),

    #[error("tunnel is enabled but no registration tokens are configured")]
    NoTunnelTokens,

    #[error("upstream {name}: {reason}")]
    InvalidUpstream { name: &'static str, reason: String },
}

pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.http_address", &config.listener.http_address);
    if config.listener.tls.is_some() {
        check_address(&mut errors, "listener.https_address", &config.listener.https_address);
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout {
            field: "timeouts.request_secs",
        });
    }

    let mut seen = HashSet::new();
    for token in &config.auth.tokens {
        if token.name.is_empty() || token.name.contains(':') {
            errors.push(ValidationError::InvalidTokenName(token.name.clone()));
        }
        if token.secret.is_empty() {
            errors.push(ValidationError::EmptySecret(token.name.clone()));
        }
        if !seen.insert(token.name.as_str()) {
            errors.push(ValidationError::DuplicateToken(token.name.clone()));
        }
    }

    if config.tunnel.enabled && config.tunnel.registration_tokens.is_empty() {
        errors.push(ValidationError::NoTunnelTokens);
    }

    for (name, url) in config.upstreams.iter() {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() != "http" => errors.push(ValidationError::InvalidUpstream {
                name,
                reason: format!("scheme {} is not supported, use http", parsed.scheme()),
            }),
            Ok(parsed) if parsed.host_str().is_none() => errors.push(ValidationError::InvalidUpstream {
                name,
                reason: "missing host".to_string(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidUpstream {
                name,
                reason: e.to_string(),
            }),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{TokenConfig, TunnelTokenConfig};

    fn token(name: &str, secret: &str) -> TokenConfig {
        TokenConfig {
            name: name.to_string(),
            secret: secret.to_string(),
            user_id: "u-1".to_string(),
            username: "admin".to_string(),
            groups: Vec::new(),
            enabled: true,
            expires_at: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&RouterConfig::default()), Ok(()));
    }

    #[test]
    fn test_token_errors() {
        let mut config = RouterConfig::default();
        config.auth.tokens = vec![token("a", "x"), token("a", "y"), token("b:c", ""), token("", "z")];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateToken("a".to_string())));
        assert!(errors.contains(&ValidationError::InvalidTokenName("b:c".to_string())));
        assert!(errors.contains(&ValidationError::EmptySecret("b:c".to_string())));
        assert!(errors.contains(&ValidationError::InvalidTokenName(String::new())));
    }

    #[test]
    fn test_tunnel_requires_tokens() {
        let mut config = RouterConfig::default();
        config.tunnel.enabled = true;
        assert_eq!(validate_config(&config), Err(vec![ValidationError::NoTunnelTokens]));

        config.tunnel.registration_tokens = vec![TunnelTokenConfig {
            token: "reg".to_string(),
            cluster: "c-1".to_string(),
        }];
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_upstream_urls() {
        let mut config = RouterConfig::default();
        config.upstreams.management = Some("http://127.0.0.1:9000".to_string());
        config.upstreams.saml = Some("https://saml.internal".to_string());
        config.upstreams.telemetry = Some("::not a url".to_string());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::InvalidUpstream { .. })));
    }
}
