//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing, timeout, metrics)
//!     → outer route table (public / whitelist / gated tiers)
//!     → middleware/ (baseline or static chain)
//!     → collaborators.rs (the handler at the end of each branch)
//!     → Send to client
//! ```

pub mod collaborators;
pub mod middleware;
pub mod server;

pub use collaborators::Collaborators;
pub use server::{build_route_table, HttpServer, ServerError};
