//! Caller identity resolution.
//!
//! # Responsibilities
//! - Define the token-service seam ([`Authenticator`]) the auth gate calls
//! - Extract credentials from `Authorization: Bearer` or the `R_SESS` cookie
//! - Provide a static token table for deployments without an external token service
//!
//! # Design Decisions
//! - Tokens have the form `<name>:<secret>`; the name is the lookup key
//! - Failure to authenticate is 401; a valid token for a disabled user is 403

use axum::{
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use futures_util::future::{self, BoxFuture};
use serde::Serialize;
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::TokenConfig;

pub const SESSION_COOKIE: &str = "R_SESS";

/// Identity attached to a request that passed the auth gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub user_id: String,
    pub username: String,
    pub groups: Vec<String>,
    pub token_name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("must authenticate")]
    MissingCredentials,

    #[error("invalid token")]
    InvalidToken,

    #[error("token {0} has expired")]
    Expired(String),

    #[error("user {0} is disabled")]
    Disabled(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Disabled(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing",
            AuthError::InvalidToken => "invalid",
            AuthError::Expired(_) => "expired",
            AuthError::Disabled(_) => "disabled",
        }
    }
}

/// Error body in the management API's shape.
#[derive(Serialize)]
pub(crate) struct ApiError {
    #[serde(rename = "type")]
    kind: &'static str,
    status: String,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub(crate) fn response(status: StatusCode, message: impl Into<String>) -> Response {
        let body = ApiError {
            kind: "error",
            status: status.as_u16().to_string(),
            code: status.canonical_reason().unwrap_or("Error"),
            message: message.into(),
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::response(self.status(), self.to_string())
    }
}

/// The token service as seen by the gate.
pub trait Authenticator: Send + Sync {
    fn authenticate<'a>(&'a self, parts: &'a Parts) -> BoxFuture<'a, Result<AuthContext, AuthError>>;
}

/// Pull the raw token from the request, header first, then session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.strip_prefix("Bearer ")
                .or_else(|| v.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .filter(|t| !t.is_empty())
}

struct TokenRecord {
    secret: String,
    context: AuthContext,
    enabled: bool,
    expires_at: Option<chrono::DateTime<Utc>>,
}

/// Static token table loaded from configuration.
pub struct TokenAuthenticator {
    tokens: HashMap<String, TokenRecord>,
}

impl TokenAuthenticator {
    pub fn from_config(tokens: &[TokenConfig]) -> Self {
        let tokens = tokens
            .iter()
            .map(|t| {
                let record = TokenRecord {
                    secret: t.secret.clone(),
                    context: AuthContext {
                        user_id: t.user_id.clone(),
                        username: t.username.clone(),
                        groups: t.groups.clone(),
                        token_name: t.name.clone(),
                    },
                    enabled: t.enabled,
                    expires_at: t.expires_at,
                };
                (t.name.clone(), record)
            })
            .collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn verify(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let token = extract_token(headers).ok_or(AuthError::MissingCredentials)?;
        let (name, secret) = token.split_once(':').ok_or(AuthError::InvalidToken)?;
        let record = self.tokens.get(name).ok_or(AuthError::InvalidToken)?;

        if !bool::from(record.secret.as_bytes().ct_eq(secret.as_bytes())) {
            return Err(AuthError::InvalidToken);
        }
        if let Some(expires_at) = record.expires_at {
            if expires_at <= Utc::now() {
                return Err(AuthError::Expired(name.to_string()));
            }
        }
        if !record.enabled {
            return Err(AuthError::Disabled(record.context.username.clone()));
        }
        Ok(record.context.clone())
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate<'a>(&'a self, parts: &'a Parts) -> BoxFuture<'a, Result<AuthContext, AuthError>> {
        Box::pin(future::ready(self.verify(&parts.headers)))
    }
}
