//! Generic proxy to allow-listed external hosts under `/meta/proxy`.
//!
//! # Responsibilities
//! - Decode the destination from the path (`/meta/proxy/<scheme>:/<host>/<path>`)
//! - Reject hosts missing from the allow-list
//! - Forward with `X-API-Auth-Header` as the outbound `Authorization`
//!
//! # Design Decisions
//! - The allow-list is swapped atomically on config reload; requests in flight
//!   keep the list they loaded
//! - Cookies and the caller's own `Authorization` never leave the cluster

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use url::Url;

use crate::proxy::ProxyError;
use crate::routing::handler::{self, Handler};
use crate::security::headers;

pub const AUTH_HEADER: &str = "x-api-auth-header";

/// Request bodies are buffered before forwarding; larger ones are rejected.
const MAX_REQUEST_BODY: usize = 10 * 1024 * 1024;

/// Hosts the generic proxy may reach: exact names or `*.suffix` wildcards.
#[derive(Debug)]
pub struct AllowList {
    hosts: ArcSwap<Vec<String>>,
}

impl AllowList {
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            hosts: ArcSwap::from_pointee(normalize(hosts)),
        }
    }

    pub fn replace(&self, hosts: Vec<String>) {
        let hosts = normalize(hosts);
        tracing::info!(count = hosts.len(), "Proxy allow-list updated");
        self.hosts.store(Arc::new(hosts));
    }

    pub fn allows(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.hosts.load().iter().any(|allowed| match allowed.strip_prefix("*.") {
            Some(suffix) => host
                .strip_suffix(suffix)
                .map(|rest| rest.ends_with('.') && rest.len() > 1)
                .unwrap_or(false),
            None => *allowed == host,
        })
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn normalize(hosts: Vec<String>) -> Vec<String> {
    hosts
        .into_iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

/// Decode the destination URL from the part of the path after `prefix`.
///
/// Path normalization upstream of the router often collapses `https://` to
/// `https:/`, so both forms are accepted. A missing scheme means https.
pub fn destination(path_and_query: &str, prefix: &str) -> Result<Url, ProxyError> {
    let rest = path_and_query
        .strip_prefix(prefix)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| ProxyError::InvalidDestination(path_and_query.to_string()))?;

    let raw = ["https", "http"]
        .iter()
        .find_map(|scheme| {
            let collapsed = format!("{scheme}:/");
            let full = format!("{scheme}://");
            if rest.starts_with(&full) {
                Some(rest.to_string())
            } else {
                rest.strip_prefix(&collapsed).map(|tail| format!("{full}{tail}"))
            }
        })
        .unwrap_or_else(|| format!("https://{rest}"));

    let url = Url::parse(&raw).map_err(|e| ProxyError::InvalidDestination(format!("{raw}: {e}")))?;
    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(ProxyError::InvalidDestination(raw));
    }
    Ok(url)
}

#[derive(Clone)]
pub struct AllowListProxy {
    allow: Arc<AllowList>,
    client: reqwest::Client,
    prefix: Arc<str>,
}

impl AllowListProxy {
    pub fn new(allow: Arc<AllowList>, prefix: &str) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::Client(e.to_string()))?;
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        Ok(Self {
            allow,
            client,
            prefix: prefix.into(),
        })
    }

    pub fn into_handler(self) -> Handler {
        handler::from_fn(move |request| {
            let proxy = self.clone();
            async move {
                match proxy.forward(request).await {
                    Ok(response) => response,
                    Err(e) => e.into_response(),
                }
            }
        })
    }

    pub async fn forward(&self, request: Request<Body>) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let url = destination(path_and_query, &self.prefix)?;

        let host = url.host_str().unwrap_or_default();
        if !self.allow.allows(host) {
            tracing::warn!(host, "Proxy destination not on allow-list");
            return Err(ProxyError::HostNotAllowed(host.to_string()));
        }

        let outbound = outbound_headers(&parts.headers);
        let body = axum::body::to_bytes(body, MAX_REQUEST_BODY)
            .await
            .map_err(|e| ProxyError::InvalidDestination(format!("request body: {e}")))?;
        tracing::debug!(method = %parts.method, url = %url, "Proxying to allow-listed host");

        let upstream = self
            .client
            .request(parts.method, url)
            .headers(outbound)
            .body(body)
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        headers::strip_hop_by_hop(&mut response_headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut outbound = inbound.clone();
    headers::strip_hop_by_hop(&mut outbound);
    headers::strip_impersonation(&mut outbound);
    for name in [header::HOST, header::COOKIE, header::AUTHORIZATION, header::CONTENT_LENGTH] {
        outbound.remove(name);
    }
    if let Some(auth) = outbound.remove(AUTH_HEADER) {
        outbound.insert(header::AUTHORIZATION, auth);
    }
    outbound
}
