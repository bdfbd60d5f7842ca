//! Tunnel sub-path dispatch.
//!
//! Produces the `connect` handler (used for `/v3/connect` and
//! `/v3/connect/register`) and the `config` handler. Without a capability both
//! are the NotFound handler.

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Json},
};
use std::sync::Arc;

use crate::routing::handler::{self, Handler};
use crate::tunnel::{NodeConfigProvider, TunnelCapability, TunnelError};

/// Returns `(connect, config)`.
pub fn connect_handlers(
    capability: Option<&TunnelCapability>,
    node_config: Arc<dyn NodeConfigProvider>,
) -> (Handler, Handler) {
    let Some(capability) = capability else {
        return (handler::not_found(), handler::not_found());
    };

    let server = capability.server.clone();
    let connect = handler::from_fn(move |request: Request<Body>| {
        let server = server.clone();
        async move { server.serve(request).await }
    });

    let authorizer = capability.authorizer.clone();
    let config = handler::from_fn(move |request: Request<Body>| {
        let authorizer = authorizer.clone();
        let provider = node_config.clone();
        async move {
            let (parts, _body) = request.into_parts();
            let agent = match authorizer.authorize(&parts).await {
                Ok(Some(agent)) => agent,
                Ok(None) => return TunnelError::Unauthorized.into_response(),
                Err(e) => return e.into_response(),
            };
            match provider.node_config(&agent).await {
                Ok(Some(doc)) => Json(doc).into_response(),
                Ok(None) => handler::not_found_response(),
                Err(e) => {
                    tracing::error!(client_key = %agent.client_key, error = %e, "Node config lookup failed");
                    e.into_response()
                }
            }
        }
    });

    (connect, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TunnelTokenConfig;
    use crate::tunnel::{StaticNodeConfig, TokenTunnelAuthorizer, TunnelServer};
    use axum::http::{Method, StatusCode};
    use axum::response::Response;
    use futures_util::future::BoxFuture;
    use tower::ServiceExt;

    struct AcceptAll;

    impl TunnelServer for AcceptAll {
        fn serve(&self, _request: Request<Body>) -> BoxFuture<'_, Response> {
            Box::pin(async { StatusCode::SWITCHING_PROTOCOLS.into_response() })
        }
    }

    fn provider() -> Arc<dyn NodeConfigProvider> {
        Arc::new(StaticNodeConfig::new("https://rancher.example.com", "abc123"))
    }

    fn capability() -> TunnelCapability {
        let authorizer = TokenTunnelAuthorizer::from_config(&[TunnelTokenConfig {
            token: "reg-token".to_string(),
            cluster: "c-abc12".to_string(),
        }]);
        TunnelCapability::new(Arc::new(AcceptAll), Arc::new(authorizer))
    }

    fn request(method: Method, path: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("X-API-Tunnel-Token", token);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_no_capability_is_not_found() {
        let (connect, config) = connect_handlers(None, provider());

        let response = connect
            .oneshot(request(Method::POST, "/v3/connect/register", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = config
            .oneshot(request(Method::GET, "/v3/connect/config", Some("reg-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_connect_delegates_to_server() {
        let capability = capability();
        let (connect, _) = connect_handlers(Some(&capability), provider());

        let response = connect
            .oneshot(request(Method::GET, "/v3/connect", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
    }

    #[tokio::test]
    async fn test_config_requires_authorized_agent() {
        let capability = capability();
        let (_, config) = connect_handlers(Some(&capability), provider());

        let response = config
            .clone()
            .oneshot(request(Method::GET, "/v3/connect/config", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = config
            .oneshot(request(Method::GET, "/v3/connect/config", Some("reg-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(doc["serverUrl"], "https://rancher.example.com");
        assert_eq!(doc["cluster"], "c-abc12");
    }
}
