//! The handler type every routing layer speaks.
//!
//! A [`Handler`] is a type-erased tower service that never fails: errors are
//! expressed as HTTP responses. Route tables, middleware chains, the auth gate
//! and collaborator adapters all produce and consume this one type, which keeps
//! composition uniform.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::future::Future;
use tower::util::BoxCloneSyncService;
use tower::{service_fn, Service};

/// Cloneable, thread-safe, type-erased request handler.
pub type Handler = BoxCloneSyncService<Request<Body>, Response, Infallible>;

/// Erase a concrete service into a [`Handler`].
pub fn boxed<S>(service: S) -> Handler
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(service)
}

/// Build a handler from an async function.
pub fn from_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    boxed(service_fn(move |request| {
        let response = f(request);
        async move { Ok::<_, Infallible>(response.await) }
    }))
}

/// A handler that always answers with the given status and message.
pub fn status(code: StatusCode, message: &'static str) -> Handler {
    from_fn(move |_request| async move { (code, message).into_response() })
}

/// The designated NotFound handler.
pub fn not_found() -> Handler {
    from_fn(|_request| async { not_found_response() })
}

pub fn not_found_response() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found").into_response()
}

pub fn method_not_allowed() -> Handler {
    status(StatusCode::METHOD_NOT_ALLOWED, "405 method not allowed")
}
