//! UI content.
//!
//! # Responsibilities
//! - Serve the bundled UI files from a configured directory
//! - Send browsers that hit an API path to the UI index page
//!
//! # Design Decisions
//! - Without a configured directory every UI path is 404
//! - Browser detection is a heuristic: GET/HEAD, `Accept` includes
//!   `text/html`, and a Mozilla-style `User-Agent`

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, Method, Request, Uri},
};
use std::io;
use std::path::Path;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::http::middleware::Middleware;
use crate::routing::handler::{self, Handler};

pub const INDEX_PATH: &str = "/index.html";

/// Static file handler rooted at `dir`.
pub fn content(dir: Option<&Path>) -> Result<Handler, io::Error> {
    let Some(dir) = dir else {
        tracing::debug!("No UI directory configured, UI paths will 404");
        return Ok(handler::not_found());
    };
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("UI directory {} does not exist", dir.display()),
        ));
    }

    tracing::info!(path = %dir.display(), "Serving UI content");
    let files = ServeDir::new(dir);
    Ok(handler::from_fn(move |request| {
        let files = files.clone();
        async move {
            match files.oneshot(request).await {
                Ok(response) => response.map(Body::new),
                Err(never) => match never {},
            }
        }
    }))
}

pub fn is_browser(method: &Method, headers: &HeaderMap) -> bool {
    if method != Method::GET && method != Method::HEAD {
        return false;
    }
    let header_contains = |name: HeaderName, needle: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains(needle))
            .unwrap_or(false)
    };
    header_contains(header::ACCEPT, "text/html") && header_contains(header::USER_AGENT, "mozilla")
}

/// Short-circuit browser requests to `index`, rewritten to the index page.
pub fn browser_ui(index: Handler) -> Middleware {
    Middleware::new("ui", move |inner| {
        let index = index.clone();
        handler::from_fn(move |mut request: Request<Body>| {
            let index = index.clone();
            let inner = inner.clone();
            async move {
                let target = if is_browser(request.method(), request.headers()) {
                    *request.uri_mut() = Uri::from_static(INDEX_PATH);
                    index
                } else {
                    inner
                };
                match target.oneshot(request).await {
                    Ok(response) => response,
                    Err(never) => match never {},
                }
            }
        })
    })
}
