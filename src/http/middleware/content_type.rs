//! Content-Type normalization.
//!
//! Handlers that stream a body without declaring its type get one sniffed from
//! the first chunk. Only that chunk is inspected; the rest of the body streams
//! through untouched.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::Response,
};
use futures_util::{future, stream, StreamExt};

use super::Middleware;

pub fn content_type() -> Middleware {
    Middleware::from_layer("content-type", middleware::from_fn(sniff_content_type))
}

async fn sniff_content_type(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.headers().contains_key(header::CONTENT_TYPE) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let mut chunks = body.into_data_stream();
    let Some(first) = chunks.next().await else {
        return Response::from_parts(parts, Body::empty());
    };

    if let Ok(chunk) = &first {
        if !chunk.is_empty() {
            parts
                .headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(detect(chunk)));
        }
    }

    let body = Body::from_stream(stream::once(future::ready(first)).chain(chunks));
    Response::from_parts(parts, body)
}

/// Signature-based detection for the handful of types the UI and API emit.
pub fn detect(data: &[u8]) -> &'static str {
    let trimmed = trim_leading_whitespace(data);

    const HTML_TAGS: [&[u8]; 7] = [
        b"<!doctype html",
        b"<html",
        b"<head",
        b"<script",
        b"<body",
        b"<title",
        b"<!--",
    ];
    if HTML_TAGS.iter().any(|tag| starts_with_ignore_case(trimmed, tag)) {
        return "text/html; charset=utf-8";
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }
    if data.starts_with(b"%PDF-") {
        return "application/pdf";
    }
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        return "image/png";
    }
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return "image/gif";
    }
    if data.starts_with(b"\xff\xd8\xff") {
        return "image/jpeg";
    }
    if data.starts_with(b"\x1f\x8b\x08") {
        return "application/x-gzip";
    }
    if is_text(data) {
        return "text/plain; charset=utf-8";
    }
    "application/octet-stream"
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn is_text(data: &[u8]) -> bool {
    // A chunk boundary may split a multi-byte character; tolerate that.
    let valid = match std::str::from_utf8(data) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };
    valid
        && !data
            .iter()
            .any(|b| matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f))
}
