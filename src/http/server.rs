//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Assemble the outer route table in its fixed precedence
//! - Assemble the inner (gated) route table behind the auth gate
//! - Wire up middleware (tracing, timeouts, request ID, metrics)
//! - Stamp each request with the deadline the timeout layer enforces
//! - Serve on the plaintext and optional TLS listeners until shutdown
//! - Drain tunnel sessions after the listeners stop
//!
//! # Precedence
//! ```text
//! PUBLIC     /, /v3-public, /v3/import/{token}.yaml, /v3/connect[/register|/config],
//!            /hooks, /v1-saml, static UI content, /healthz, /ping
//! WHITELIST  GET /v3/settings/{cacerts,first-login,ui-pl} → inner table, no gate
//! GATED      /v3, /k8s/clusters/, /meta, /v1-telemetry → auth gate → inner table
//! fallback   404 / 405 through the baseline chain
//! ```

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::{self, Next},
    response::Response,
    Extension, Router,
};
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RouterConfig;
use crate::health;
use crate::http::collaborators::Collaborators;
use crate::http::middleware::{self as chain, MiddlewareChain};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::listener::{self, SecureListener};
use crate::net::tls::TlsError;
use crate::observability::audit::RequestDeadline;
use crate::observability::metrics;
use crate::proxy::ForwardedProto;
use crate::routing::handler::{self, Handler};
use crate::routing::{MatchedRoute, RouteTable};
use crate::security::AuthGate;
use crate::tunnel::{connect_handlers, SessionRegistry};
use crate::ui;

/// Priority tiers; higher is checked first.
pub const PUBLIC: i32 = 300;
pub const WHITELIST: i32 = 200;
pub const GATED: i32 = 100;

pub const WHITELISTED_SETTINGS: [&str; 3] = [
    "/v3/settings/cacerts",
    "/v3/settings/first-login",
    "/v3/settings/ui-pl",
];

pub const GATED_PREFIXES: [&str; 4] = ["/v3", "/k8s/clusters/", "/meta", "/v1-telemetry"];

pub const CLOUD_CAPABILITY_PATHS: [&str; 5] = [
    "/meta/gkeMachineTypes",
    "/meta/gkeVersions",
    "/meta/gkeZones",
    "/meta/aksVersions",
    "/meta/aksVirtualNetworks",
];

const STATIC_PREFIXES: [&str; 3] = ["/assets", "/translations", "/api-ui"];
const STATIC_FILES: [&str; 4] = ["/humans.txt", "/index.html", "/robots.txt", "/VERSION.txt"];
const CACHED_EXTENSIONS: [&str; 3] = ["json", "js", "css"];

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to initialize {collaborator}: {reason}")]
    CollaboratorInit {
        collaborator: &'static str,
        reason: String,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}

/// Chain for dynamic content: no caching, sniffed content type, browsers to the UI.
pub fn baseline_chain(ui_index: Handler) -> MiddlewareChain {
    MiddlewareChain::new(vec![
        chain::gzip(),
        chain::no_cache(),
        chain::content_type(),
        ui::browser_ui(ui_index),
    ])
}

/// Chain for static UI content: long-lived caching of fingerprinted assets.
pub fn static_chain() -> MiddlewareChain {
    MiddlewareChain::new(vec![chain::gzip(), chain::cache(&CACHED_EXTENSIONS)])
}

/// The table the auth gate delegates to.
pub fn build_authed_table(c: &Collaborators) -> RouteTable {
    let mut builder = RouteTable::builder();
    for path in CLOUD_CAPABILITY_PATHS {
        builder = builder.register_exact(path, &[], c.cloud_capabilities.clone());
    }
    builder
        .register_prefix("/meta/proxy", c.meta_proxy.clone())
        .register_prefix("/meta", c.management_api.clone())
        .register_prefix("/v3/identit", c.token_api.clone())
        .register_prefix("/v3/token", c.token_api.clone())
        .register_prefix("/k8s/clusters/", c.cluster_proxy.clone())
        .register_prefix("/v1-telemetry", c.telemetry_proxy.clone())
        .register_prefix("/v3", c.management_api.clone())
        .build()
}

/// The outer table every request enters.
pub fn build_route_table(c: &Collaborators) -> RouteTable {
    let baseline = baseline_chain(c.ui_content.clone());
    let static_content = static_chain().handler(c.ui_content.clone());

    let authed = handler::boxed(build_authed_table(c));
    let gate = AuthGate::new(c.authenticator.clone(), c.audit.clone(), authed.clone()).into_handler();
    let (connect, connect_config) = connect_handlers(c.tunnel.as_ref(), c.node_config.clone());

    let mut builder = RouteTable::builder()
        .priority(PUBLIC)
        .register_exact("/", &[], baseline.handler(c.management_api.clone()))
        .register_prefix("/v3-public", c.public_api.clone())
        .register_exact("/v3/import/{token}.yaml", &[], c.cluster_import.clone())
        .register_exact("/v3/connect", &[], connect.clone())
        .register_exact("/v3/connect/register", &[], connect)
        .register_exact("/v3/connect/config", &[], connect_config)
        .register_prefix("/hooks", c.webhooks.clone())
        .register_prefix("/v1-saml", c.saml.clone());
    for prefix in STATIC_PREFIXES {
        builder = builder.register_prefix(prefix, static_content.clone());
    }
    for file in STATIC_FILES {
        builder = builder.register_exact(file, &[], static_content.clone());
    }
    builder = builder
        .register_exact("/healthz", &[], health::healthz())
        .register_exact("/ping", &[], health::ping());

    builder = builder.priority(WHITELIST);
    for path in WHITELISTED_SETTINGS {
        builder = builder.register_exact(path, &[Method::GET], authed.clone());
    }

    builder = builder.priority(GATED);
    for prefix in GATED_PREFIXES {
        builder = builder.register_prefix(prefix, gate.clone());
    }

    builder
        .not_found(baseline.handler(handler::not_found()))
        .method_not_allowed(baseline.handler(handler::method_not_allowed()))
        .build()
}

/// HTTP server for the front door.
pub struct HttpServer {
    router: Router,
    config: RouterConfig,
    sessions: SessionRegistry,
}

impl HttpServer {
    pub fn new(config: RouterConfig, collaborators: Collaborators) -> Self {
        let table = build_route_table(&collaborators);
        tracing::info!(
            routes = table.entries().len(),
            tunnel = collaborators.tunnel.is_some(),
            "Route table assembled"
        );
        let router = Self::build_router(&config, table);
        Self {
            router,
            config,
            sessions: collaborators.sessions,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RouterConfig, table: RouteTable) -> Router {
        let budget = Duration::from_secs(config.timeouts.request_secs);
        Router::new()
            .fallback_service(table)
            .layer(middleware::from_fn(track_metrics))
            .layer(TimeoutLayer::new(budget))
            .layer(middleware::from_fn_with_state(budget, stamp_deadline))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then wait (bounded) for tunnel sessions to close.
    pub async fn run(
        self,
        listener: TcpListener,
        secure: Option<SecureListener>,
        shutdown: &Shutdown,
    ) -> Result<(), ServerError> {
        let grace = Duration::from_secs(self.config.timeouts.shutdown_secs);

        let plaintext = listener::serve_plaintext(listener, self.router.clone(), shutdown.clone());
        let tls_router = self.router.clone().layer(Extension(ForwardedProto("https")));
        let secure_shutdown = shutdown.clone();
        let tls = async move {
            match secure {
                Some(secure) => listener::serve_tls(secure, tls_router, secure_shutdown, grace).await,
                None => Ok(()),
            }
        };
        tokio::try_join!(plaintext, tls)?;

        if !self.sessions.is_empty() {
            tracing::info!(sessions = self.sessions.len(), "Draining tunnel sessions");
        }
        self.sessions
            .wait_idle(Duration::from_secs(self.config.tunnel.drain_secs))
            .await;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Record when the timeout layer will give up on this request.
async fn stamp_deadline(State(budget): State<Duration>, mut request: Request, next: Next) -> Response {
    request
        .extensions_mut()
        .insert(RequestDeadline(tokio::time::Instant::now() + budget));
    next.run(request).await
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let response = next.run(request).await;

    let route = response
        .extensions()
        .get::<MatchedRoute>()
        .map(MatchedRoute::as_str)
        .unwrap_or("unmatched");
    metrics::record_request(method.as_str(), route, response.status().as_u16(), start);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::observability::audit::AuditLog;
    use crate::security::TokenAuthenticator;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::IntoResponse;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn labelled(label: &'static str) -> Handler {
        handler::from_fn(move |_request| async move { label.into_response() })
    }

    fn collaborators() -> Collaborators {
        let authenticator = TokenAuthenticator::from_config(&[TokenConfig {
            name: "token-admin".to_string(),
            secret: "secret".to_string(),
            user_id: "u-admin".to_string(),
            username: "admin".to_string(),
            groups: Vec::new(),
            enabled: true,
            expires_at: None,
        }]);
        let mut c = Collaborators::unconfigured(Arc::new(authenticator), Arc::new(AuditLog::disabled()));
        c.management_api = labelled("management");
        c.public_api = labelled("public");
        c.token_api = labelled("token");
        c.cluster_import = labelled("import");
        c.cloud_capabilities = labelled("capabilities");
        c.meta_proxy = labelled("meta-proxy");
        c.cluster_proxy = labelled("k8s");
        c.webhooks = labelled("hooks");
        c
    }

    async fn call(table: &RouteTable, method: Method, path: &str, authed: bool) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(path);
        if authed {
            builder = builder.header(header::AUTHORIZATION, "Bearer token-admin:secret");
        }
        let response = table
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_public_routes_skip_the_gate() {
        let table = build_route_table(&collaborators());

        assert_eq!(call(&table, Method::GET, "/v3-public/authProviders", false).await.1, "public");
        assert_eq!(call(&table, Method::GET, "/v3/import/abc123.yaml", false).await.1, "import");
        assert_eq!(call(&table, Method::POST, "/hooks/github", false).await.1, "hooks");
        assert_eq!(call(&table, Method::GET, "/healthz", false).await.1, "ok");
        assert_eq!(call(&table, Method::GET, "/ping", false).await.1, "pong");
    }

    #[tokio::test]
    async fn test_gated_routes_need_credentials() {
        let table = build_route_table(&collaborators());

        for path in ["/v3/clusters", "/k8s/clusters/c-1/api", "/meta/gkeZones", "/v1-telemetry/x"] {
            let (status, _) = call(&table, Method::GET, path, false).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
        }
    }

    #[tokio::test]
    async fn test_inner_table_order() {
        let table = build_route_table(&collaborators());

        let cases = [
            ("/meta/gkeZones", "capabilities"),
            ("/meta/proxy/api.example.com", "meta-proxy"),
            ("/meta/other", "management"),
            ("/v3/identities", "token"),
            ("/v3/tokens", "token"),
            ("/k8s/clusters/c-1/api/v1/pods", "k8s"),
            ("/v3/clusters", "management"),
        ];
        for (path, expected) in cases {
            assert_eq!(call(&table, Method::GET, path, true).await.1, expected, "{path}");
        }
    }

    #[tokio::test]
    async fn test_whitelisted_settings_are_get_only() {
        let table = build_route_table(&collaborators());

        let (status, body) = call(&table, Method::GET, "/v3/settings/cacerts", false).await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "management"));

        let (status, _) = call(&table, Method::PUT, "/v3/settings/cacerts", false).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&table, Method::GET, "/v3/settings/other-key", false).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_tunnel_paths_without_capability() {
        let table = build_route_table(&collaborators());
        for path in ["/v3/connect", "/v3/connect/register", "/v3/connect/config"] {
            let (status, _) = call(&table, Method::POST, path, false).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        }
    }

    #[tokio::test]
    async fn test_not_found_carries_baseline_headers() {
        let table = build_route_table(&collaborators());
        let response = table
            .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            chain::cache::NO_CACHE
        );
        assert!(response.headers().contains_key(header::EXPIRES));
    }

    #[tokio::test]
    async fn test_run_returns_when_shutdown_came_first() {
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let server = HttpServer::new(RouterConfig::default(), collaborators());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let outcome =
            tokio::time::timeout(Duration::from_secs(3), server.run(listener, None, &shutdown)).await;

        assert!(matches!(outcome, Ok(Ok(()))));
    }
}
