//! Middleware chains.
//!
//! # Data Flow
//! ```text
//! MiddlewareChain [m0, m1, m2] + terminal handler
//!     → m0( m1( m2( terminal ) ) )
//!
//! Request:  m0 pre → m1 pre → m2 pre → terminal
//! Response: terminal → m2 post → m1 post → m0 post
//! ```
//!
//! # Design Decisions
//! - A middleware is a pure `Handler → Handler` transform
//! - The first middleware in the list is the outermost wrapper
//! - Middlewares may pass through, rewrite the response, or short-circuit

pub mod cache;
pub mod content_type;

use axum::{body::Body, http::Request, response::Response};
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use tower::{Layer, Service, ServiceBuilder};
use tower_http::compression::{CompressionBody, CompressionLayer};

use crate::routing::handler::{self, Handler};

pub use cache::{cache, no_cache};
pub use content_type::content_type;

/// A named `Handler → Handler` transform.
#[derive(Clone)]
pub struct Middleware {
    name: &'static str,
    wrap: Arc<dyn Fn(Handler) -> Handler + Send + Sync>,
}

impl Middleware {
    pub fn new<F>(name: &'static str, wrap: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self {
            name,
            wrap: Arc::new(wrap),
        }
    }

    /// Adapt any tower layer whose service keeps the handler signature.
    pub fn from_layer<L>(name: &'static str, layer: L) -> Self
    where
        L: Layer<Handler> + Send + Sync + 'static,
        L::Service: Service<Request<Body>, Response = Response, Error = Infallible>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Request<Body>>>::Future: Send + 'static,
    {
        Self::new(name, move |inner| handler::boxed(layer.layer(inner)))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn wrap(&self, inner: Handler) -> Handler {
        (self.wrap)(inner)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.name).finish()
    }
}

/// An ordered list of middlewares applied around a terminal handler.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Middleware>,
}

impl MiddlewareChain {
    pub fn new(middlewares: Vec<Middleware>) -> Self {
        Self { middlewares }
    }

    /// Compose the chain around `terminal`; the first middleware ends up outermost.
    pub fn handler(&self, terminal: Handler) -> Handler {
        self.middlewares
            .iter()
            .rev()
            .fold(terminal, |inner, middleware| middleware.wrap(inner))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(Middleware::name).collect()
    }
}

/// Gzip response compression, negotiated through `Accept-Encoding`.
pub fn gzip() -> Middleware {
    Middleware::new("gzip", |inner| {
        handler::boxed(
            ServiceBuilder::new()
                .map_response(|response: Response<CompressionBody<Body>>| response.map(Body::new))
                .layer(CompressionLayer::new().gzip(true))
                .service(inner),
        )
    })
}
