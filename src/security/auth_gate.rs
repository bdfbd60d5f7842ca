//! The authentication gate in front of protected routes.
//!
//! # Responsibilities
//! - Resolve the caller's identity on every request (no caching)
//! - Reject unauthenticated requests before any inner dispatch
//! - Attach [`AuthContext`] and trusted impersonation headers on success
//! - Emit exactly one audit record per request, whatever the outcome
//! - Answer 400 without dispatching when an audited body cannot be read
//!
//! # Design Decisions
//! - The gate is the single audit choke point; inner handlers never audit
//! - The inner route table is only reachable through [`AuthGate::call`]
//! - The record is held in a [`PendingAudit`] so a request dropped by the
//!   outer timeout or a vanished client is still audited
//!
//! [`PendingAudit`]: crate::observability::audit::PendingAudit

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};

use crate::observability::audit::{AuditLog, AuditUser};
use crate::observability::metrics;
use crate::routing::handler::{self, Handler};
use crate::security::authenticator::{ApiError, Authenticator};
use crate::security::headers;

#[derive(Clone)]
pub struct AuthGate {
    authenticator: Arc<dyn Authenticator>,
    audit: Arc<AuditLog>,
    inner: Handler,
}

impl AuthGate {
    pub fn new(authenticator: Arc<dyn Authenticator>, audit: Arc<AuditLog>, inner: Handler) -> Self {
        Self {
            authenticator,
            audit,
            inner,
        }
    }

    pub fn into_handler(self) -> Handler {
        handler::boxed(self)
    }

    async fn serve(self, request: Request<Body>) -> Response {
        let (mut parts, body) = request.into_parts();
        let mut audit = self.audit.track(&parts);

        let ctx = match self.authenticator.authenticate(&parts).await {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::debug!(
                    path = %parts.uri.path(),
                    reason = err.reason(),
                    "Authentication failed"
                );
                metrics::record_auth_failure(err.reason());
                let response = err.into_response();
                audit.finish(response.status());
                return response;
            }
        };

        audit.record_mut().user = Some(AuditUser::from(&ctx));
        headers::set_impersonation(&mut parts.headers, &ctx);
        tracing::trace!(user_id = %ctx.user_id, path = %parts.uri.path(), "Authenticated");
        parts.extensions.insert(ctx);

        let body = match self
            .audit
            .capture_request_body(audit.record_mut(), &parts.headers, body)
            .await
        {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(path = %parts.uri.path(), error = %err, "Rejecting request with unreadable body");
                let response = ApiError::response(StatusCode::BAD_REQUEST, err.to_string());
                audit.finish(response.status());
                return response;
            }
        };

        let response = match self.inner.oneshot(Request::from_parts(parts, body)).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        audit.finish(response.status());
        response
    }
}

impl Service<Request<Body>> for AuthGate {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let gate = self.clone();
        Box::pin(async move { Ok(gate.serve(request).await) })
    }
}
