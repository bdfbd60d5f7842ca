//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::response::IntoResponse;
use front_door::config::{RouterConfig, TokenConfig, TunnelTokenConfig};
use front_door::http::{Collaborators, HttpServer, ServerError};
use front_door::lifecycle::Shutdown;
use front_door::observability::audit::{AuditLevel, AuditLog, AuditRecord};
use front_door::routing::handler::{self, Handler};
use front_door::security::TokenAuthenticator;
use front_door::tunnel::{SessionRegistry, TokenTunnelAuthorizer, TunnelCapability};
use front_door::ui;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const ADMIN_TOKEN: &str = "token-admin:secret";
pub const REGISTRATION_TOKEN: &str = "reg-token";
pub const CLUSTER: &str = "c-abc12";

/// In-memory audit destination.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    pub fn records(&self) -> Vec<AuditRecord> {
        String::from_utf8(self.0.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

/// A collaborator stand-in that answers `<label>|<impersonated user>` and counts hits.
pub fn labelled(label: &'static str, hits: Arc<AtomicUsize>) -> Handler {
    handler::from_fn(move |request: Request<Body>| {
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            let user = request
                .headers()
                .get("impersonate-user")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string();
            format!("{label}|{user}").into_response()
        }
    })
}

/// Write a minimal UI bundle into a fresh temp directory.
pub fn ui_bundle() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("front-door-ui-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(dir.join("assets")).unwrap();
    std::fs::write(dir.join("index.html"), "<html><body>ui</body></html>").unwrap();
    std::fs::write(dir.join("assets/app.js"), "console.log('ui');").unwrap();
    std::fs::write(dir.join("assets/app.svg"), "<svg/>").unwrap();
    dir
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub sessions: SessionRegistry,
    audit_log: Arc<AuditLog>,
    audit: SharedBuffer,
    /// Hits on the management API stand-in.
    pub management_hits: Arc<AtomicUsize>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Every audit record written so far.
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit_log.flush().await;
        self.audit.records()
    }

    /// Trigger shutdown and wait for the server task to return.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
    }
}

fn test_config() -> RouterConfig {
    let mut config = RouterConfig::default();
    config.auth.tokens = vec![TokenConfig {
        name: "token-admin".to_string(),
        secret: "secret".to_string(),
        user_id: "u-admin".to_string(),
        username: "admin".to_string(),
        groups: vec!["system:authenticated".to_string()],
        enabled: true,
        expires_at: None,
    }];
    config.tunnel.drain_secs = 2;
    config
}

/// Start a server on an ephemeral port with stand-in collaborators.
pub async fn spawn_server(with_tunnel: bool) -> TestServer {
    spawn_server_with(with_tunnel, |_, _| {}).await
}

/// Like [`spawn_server`], letting the test adjust config and stand-ins before serving.
pub async fn spawn_server_with<F>(with_tunnel: bool, customize: F) -> TestServer
where
    F: FnOnce(&mut RouterConfig, &mut Collaborators),
{
    let mut config = test_config();
    let shutdown = Shutdown::new();
    let audit = SharedBuffer::default();
    let management_hits = Arc::new(AtomicUsize::new(0));
    let other_hits = Arc::new(AtomicUsize::new(0));

    let audit_log = Arc::new(AuditLog::new(AuditLevel::Metadata, audit.clone()).unwrap());
    let mut collaborators = Collaborators::unconfigured(
        Arc::new(TokenAuthenticator::from_config(&config.auth.tokens)),
        audit_log.clone(),
    );
    collaborators.management_api = labelled("management", management_hits.clone());
    collaborators.public_api = labelled("public", other_hits.clone());
    collaborators.token_api = labelled("token", other_hits.clone());
    collaborators.cluster_import = labelled("import", other_hits.clone());
    collaborators.webhooks = labelled("webhooks", other_hits.clone());
    collaborators.cluster_proxy = labelled("cluster-proxy", other_hits.clone());
    let ui_dir = ui_bundle();
    collaborators.ui_content = ui::content(Some(ui_dir.as_path())).unwrap();
    if with_tunnel {
        let authorizer = TokenTunnelAuthorizer::from_config(&[TunnelTokenConfig {
            token: REGISTRATION_TOKEN.to_string(),
            cluster: CLUSTER.to_string(),
        }]);
        collaborators.tunnel = Some(TunnelCapability::websocket(
            Arc::new(authorizer),
            collaborators.sessions.clone(),
            shutdown.clone(),
        ));
    }
    customize(&mut config, &mut collaborators);
    let sessions = collaborators.sessions.clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, collaborators);
    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move { server.run(listener, None, &server_shutdown).await });

    TestServer {
        addr,
        shutdown,
        sessions,
        audit_log,
        audit,
        management_hits,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
