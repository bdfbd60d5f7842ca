//! Forwarding to configured upstream services.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the upstream base URL
//! - Strip hop-by-hop headers in both directions
//! - Add X-Forwarded-For / -Host / -Proto and replace Host
//! - Drop impersonation headers unless the auth gate produced them
//!
//! # Design Decisions
//! - One shared hyper-util client (plain HTTP, pooled) for every upstream
//! - Upstream errors become 502; there is no retry

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderValue, Request, Uri},
    response::{IntoResponse, Response},
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::proxy::ProxyError;
use crate::routing::handler::{self, Handler};
use crate::security::{headers, AuthContext};

pub type HttpClient = Client<HttpConnector, Body>;

/// Scheme the client used to reach the router, set per listener.
#[derive(Debug, Clone, Copy)]
pub struct ForwardedProto(pub &'static str);

pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

#[derive(Clone)]
pub struct UpstreamProxy {
    name: Arc<str>,
    base: Arc<str>,
    authority: HeaderValue,
    client: HttpClient,
}

impl UpstreamProxy {
    pub fn new(name: &str, base_url: &str, client: HttpClient) -> Result<Self, ProxyError> {
        let base = base_url.trim_end_matches('/');
        let uri: Uri = base
            .parse()
            .map_err(|e| ProxyError::InvalidDestination(format!("{name}: {e}")))?;
        if uri.scheme_str() != Some("http") {
            return Err(ProxyError::InvalidDestination(format!(
                "{name}: only http upstreams are supported, got {base}"
            )));
        }
        let authority = uri
            .authority()
            .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
            .ok_or_else(|| ProxyError::InvalidDestination(format!("{name}: missing host in {base}")))?;

        Ok(Self {
            name: name.into(),
            base: base.into(),
            authority,
            client,
        })
    }

    pub fn into_handler(self) -> Handler {
        handler::from_fn(move |request| {
            let proxy = self.clone();
            async move { proxy.forward(request).await }
        })
    }

    fn target_uri(&self, original: &Uri) -> Result<Uri, ProxyError> {
        let path_and_query = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{}{}", self.base, path_and_query)
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| ProxyError::InvalidDestination(e.to_string()))
    }

    pub async fn forward(&self, request: Request<Body>) -> Response {
        let (mut parts, body) = request.into_parts();

        let uri = match self.target_uri(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => return e.into_response(),
        };

        let client_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let proto = parts
            .extensions
            .get::<ForwardedProto>()
            .map(|p| p.0)
            .unwrap_or("http");

        if parts.extensions.get::<AuthContext>().is_none() {
            headers::strip_impersonation(&mut parts.headers);
        }
        headers::strip_hop_by_hop(&mut parts.headers);
        headers::append_forwarded(&mut parts.headers, client_addr, proto);
        parts.headers.insert(header::HOST, self.authority.clone());

        tracing::debug!(upstream = %self.name, uri = %uri, method = %parts.method, "Forwarding request");
        parts.uri = uri;

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                headers::strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(upstream = %self.name, error = %e, "Upstream error");
                ProxyError::Upstream(self.name.to_string()).into_response()
            }
        }
    }
}

/// A collaborator that was not configured: every request gets 503.
pub fn unavailable(name: &str) -> Handler {
    let name: Arc<str> = name.into();
    handler::from_fn(move |_request| {
        let name = name.clone();
        async move { ProxyError::NotConfigured(name.to_string()).into_response() }
    })
}

/// Proxy to `url` when configured, otherwise [`unavailable`].
pub fn upstream_or_unavailable(
    name: &str,
    url: Option<&str>,
    client: &HttpClient,
) -> Result<Handler, ProxyError> {
    match url {
        Some(url) => Ok(UpstreamProxy::new(name, url, client.clone())?.into_handler()),
        None => {
            tracing::debug!(upstream = name, "Upstream not configured");
            Ok(unavailable(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::Router;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    async fn echo_upstream() -> SocketAddr {
        async fn echo(request: Request<Body>) -> String {
            let headers: &HeaderMap = request.headers();
            let get = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-")
                    .to_string()
            };
            format!(
                "{} {} host={} impersonate={} proto={}",
                request.method(),
                request.uri(),
                get("host"),
                get("impersonate-user"),
                get("x-forwarded-proto"),
            )
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(echo);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_forwards_path_and_query() {
        let addr = echo_upstream().await;
        let proxy = UpstreamProxy::new("management", &format!("http://{addr}/"), http_client())
            .unwrap()
            .into_handler();

        let request = Request::builder()
            .method("PUT")
            .uri("/v3/clusters/c-1?action=edit")
            .header("Impersonate-User", "root")
            .body(Body::empty())
            .unwrap();
        let response = proxy.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            format!("PUT /v3/clusters/c-1?action=edit host={addr} impersonate=- proto=http")
        );
    }

    #[tokio::test]
    async fn test_gated_identity_is_forwarded() {
        let addr = echo_upstream().await;
        let proxy = UpstreamProxy::new("management", &format!("http://{addr}"), http_client())
            .unwrap()
            .into_handler();

        let mut request = Request::builder()
            .uri("/v3")
            .header("Impersonate-User", "u-admin")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(AuthContext {
            user_id: "u-admin".to_string(),
            username: "admin".to_string(),
            groups: Vec::new(),
            token_name: "t".to_string(),
        });
        request.extensions_mut().insert(ForwardedProto("https"));

        let body = body_string(proxy.oneshot(request).await.unwrap()).await;
        assert!(body.ends_with("impersonate=u-admin proto=https"), "{body}");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let proxy = UpstreamProxy::new("telemetry", &format!("http://{addr}"), http_client())
            .unwrap()
            .into_handler();
        let response = proxy
            .oneshot(Request::builder().uri("/v1-telemetry").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_unconfigured_upstream_is_unavailable() {
        let handler = upstream_or_unavailable("saml", None, &http_client()).unwrap();
        let response = handler
            .oneshot(Request::builder().uri("/v1-saml/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(UpstreamProxy::new("x", "https://example.com", http_client()).is_err());
        assert!(UpstreamProxy::new("x", "not a url", http_client()).is_err());
    }
}
