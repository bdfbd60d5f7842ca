//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (plaintext via axum::serve, TLS via axum-server)
//!     → tls.rs (certificate loading for the secure listener)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional; without it only the plaintext listener runs
//! - Certificates are checked before any listener binds

pub mod listener;
pub mod tls;

pub use listener::SecureListener;
