//! Cache-control decorators for static and dynamic content.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;

use super::Middleware;
use crate::routing::handler;

/// One year, for fingerprinted static assets.
pub const CACHE_FOREVER: &str = "max-age=31536000, public";
pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";
pub const EXPIRED: &str = "Wed 24 Feb 1982 18:42:00 GMT";

/// Mark dynamic responses as uncacheable unless the handler said otherwise.
pub fn no_cache() -> Middleware {
    Middleware::new("no-cache", |inner| {
        handler::boxed(
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static(NO_CACHE),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::EXPIRES,
                    HeaderValue::from_static(EXPIRED),
                ))
                .service(inner),
        )
    })
}

/// Long-lived caching for paths ending in one of `extensions` (without the dot).
pub fn cache(extensions: &[&str]) -> Middleware {
    let extensions: Arc<[String]> = extensions.iter().map(|e| e.to_string()).collect();
    Middleware::from_layer(
        "cache",
        middleware::from_fn_with_state(extensions, cache_static),
    )
}

async fn cache_static(
    State(extensions): State<Arc<[String]>>,
    request: Request,
    next: Next,
) -> Response {
    let cacheable = has_extension(request.uri().path(), &extensions);
    let mut response = next.run(request).await;
    if cacheable {
        response
            .headers_mut()
            .entry(header::CACHE_CONTROL)
            .or_insert(HeaderValue::from_static(CACHE_FOREVER));
    }
    response
}

fn has_extension(path: &str, extensions: &[String]) -> bool {
    match path.rfind('.') {
        Some(dot) => {
            let extension = &path[dot + 1..];
            extensions.iter().any(|e| e == extension)
        }
        None => false,
    }
}
