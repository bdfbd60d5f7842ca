//! Header manipulation.
//!
//! # Responsibilities
//! - Replace client-supplied impersonation headers with the gate's identity
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Strip hop-by-hop headers
//!
//! # Design Decisions
//! - Impersonation headers are never trusted from the client
//! - Preserve original client IP in X-Forwarded-For

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use std::net::SocketAddr;

use crate::security::AuthContext;

pub const IMPERSONATE_USER: &str = "impersonate-user";
pub const IMPERSONATE_GROUP: &str = "impersonate-group";
const IMPERSONATE_PREFIX: &str = "impersonate-";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove every `Impersonate-*` header.
pub fn strip_impersonation(headers: &mut HeaderMap) {
    let names: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with(IMPERSONATE_PREFIX))
        .cloned()
        .collect();
    for name in names {
        headers.remove(&name);
    }
}

/// Assert the gate's identity to downstream collaborators.
pub fn set_impersonation(headers: &mut HeaderMap, ctx: &AuthContext) {
    strip_impersonation(headers);

    match HeaderValue::from_str(&ctx.user_id) {
        Ok(value) => {
            headers.insert(HeaderName::from_static(IMPERSONATE_USER), value);
        }
        Err(_) => tracing::warn!(user_id = %ctx.user_id, "User id is not a valid header value"),
    }
    for group in &ctx.groups {
        if let Ok(value) = HeaderValue::from_str(group) {
            headers.append(HeaderName::from_static(IMPERSONATE_GROUP), value);
        }
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(&name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Append the client to `X-Forwarded-For` and record the original host and scheme.
pub fn append_forwarded(headers: &mut HeaderMap, client: Option<SocketAddr>, proto: &str) {
    if let Some(client) = client {
        let ip = client.ip().to_string();
        let forwarded_for = match headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            Some(existing) => format!("{existing}, {ip}"),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert("x-forwarded-for", value);
        }
    }

    if let Some(host) = headers.get(header::HOST).cloned() {
        headers.entry("x-forwarded-host").or_insert(host);
    }
    if let Ok(value) = HeaderValue::from_str(proto) {
        headers.entry("x-forwarded-proto").or_insert(value);
    }
}
