//! Ordered route table and dispatch.
//!
//! # Responsibilities
//! - Store route entries in registration order, grouped by priority tier
//! - Look up the first entry matching a request's method and path
//! - Dispatch to the matched handler, or to the NotFound / MethodNotAllowed handler
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks, shared via `Arc`)
//! - An explicit ordered `Vec`, never a map: the first match wins
//! - Exact entries get no implicit preference over prefixes; only the priority
//!   tier and then insertion order decide
//! - A path that matched only with the wrong method answers 405 rather than 404

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
};
use futures_util::future::BoxFuture;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};

use crate::routing::handler::{self, Handler};
use crate::routing::matcher::{PathParams, Pattern};

/// A single pattern → handler binding.
pub struct RouteEntry {
    pattern: Pattern,
    /// Empty means any method.
    methods: Vec<Method>,
    handler: Handler,
    priority: i32,
    order: usize,
}

impl RouteEntry {
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Insertion index across the whole table.
    pub fn order(&self) -> usize {
        self.order
    }

    fn accepts(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("pattern", &self.pattern)
            .field("methods", &self.methods)
            .field("priority", &self.priority)
            .field("order", &self.order)
            .finish()
    }
}

/// Result of a route lookup.
#[derive(Debug)]
pub enum RouteMatch<'a> {
    Found {
        entry: &'a RouteEntry,
        params: PathParams,
    },
    /// Some entry matched the path, but none accepted the method.
    MethodNotAllowed,
    NotFound,
}

/// Pattern of the outermost table entry that served a response.
///
/// Attached to response extensions for metrics labelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute(pub String);

impl MatchedRoute {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct TableInner {
    entries: Vec<RouteEntry>,
    not_found: Handler,
    method_not_allowed: Handler,
}

/// Immutable, ordered route table. Cheap to clone.
#[derive(Clone)]
pub struct RouteTable {
    inner: Arc<TableInner>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new()
    }

    /// Entries in match order.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.inner.entries
    }

    /// Find the first entry satisfying `method` and `path`.
    pub fn match_route(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        let mut path_matched = false;
        for entry in &self.inner.entries {
            let Some(params) = entry.pattern.matches(path) else {
                continue;
            };
            if entry.accepts(method) {
                return RouteMatch::Found { entry, params };
            }
            path_matched = true;
        }

        if path_matched {
            RouteMatch::MethodNotAllowed
        } else {
            RouteMatch::NotFound
        }
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTable")
            .field("entries", &self.inner.entries)
            .finish()
    }
}

impl Service<Request<Body>> for RouteTable {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let (handler, route) = match self.match_route(request.method(), request.uri().path()) {
            RouteMatch::Found { entry, params } => {
                if !params.is_empty() {
                    request.extensions_mut().insert(params);
                }
                (entry.handler.clone(), entry.pattern.as_str().to_string())
            }
            RouteMatch::MethodNotAllowed => {
                tracing::debug!(
                    method = %request.method(),
                    path = %request.uri().path(),
                    "Method not allowed"
                );
                (self.inner.method_not_allowed.clone(), "unmatched".to_string())
            }
            RouteMatch::NotFound => {
                tracing::debug!(path = %request.uri().path(), "No route matched");
                (self.inner.not_found.clone(), "unmatched".to_string())
            }
        };

        Box::pin(async move {
            let mut response = handler.oneshot(request).await?;
            response.extensions_mut().insert(MatchedRoute(route));
            Ok(response)
        })
    }
}

/// Collects entries during bootstrap, then freezes them into a [`RouteTable`].
pub struct RouteTableBuilder {
    entries: Vec<RouteEntry>,
    priority: i32,
    not_found: Option<Handler>,
    method_not_allowed: Option<Handler>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            priority: 0,
            not_found: None,
            method_not_allowed: None,
        }
    }

    /// Priority tier for entries registered after this call (higher = checked first).
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Register an exact (optionally templated) path. Empty `methods` accepts any.
    pub fn register_exact(self, pattern: &str, methods: &[Method], handler: Handler) -> Self {
        self.push(Pattern::exact(pattern), methods.to_vec(), handler)
    }

    /// Register a string prefix accepting any method.
    pub fn register_prefix(self, pattern: &str, handler: Handler) -> Self {
        self.push(Pattern::prefix(pattern), Vec::new(), handler)
    }

    pub fn not_found(mut self, handler: Handler) -> Self {
        self.not_found = Some(handler);
        self
    }

    pub fn method_not_allowed(mut self, handler: Handler) -> Self {
        self.method_not_allowed = Some(handler);
        self
    }

    fn push(mut self, pattern: Pattern, methods: Vec<Method>, handler: Handler) -> Self {
        let order = self.entries.len();
        self.entries.push(RouteEntry {
            pattern,
            methods,
            handler,
            priority: self.priority,
            order,
        });
        self
    }

    /// Freeze the table. The sort is stable, so registration order decides ties.
    pub fn build(mut self) -> RouteTable {
        self.entries
            .sort_by(|a, b| b.priority.cmp(&a.priority));

        tracing::debug!(routes = self.entries.len(), "Route table built");

        RouteTable {
            inner: Arc::new(TableInner {
                entries: self.entries,
                not_found: self.not_found.unwrap_or_else(handler::not_found),
                method_not_allowed: self
                    .method_not_allowed
                    .unwrap_or_else(handler::method_not_allowed),
            }),
        }
    }
}

impl Default for RouteTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}
