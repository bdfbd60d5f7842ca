//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Request for a protected branch:
//!     → auth_gate.rs (resolve identity, audit)
//!     → authenticator.rs (token service seam)
//!     → headers.rs (trusted impersonation headers)
//!     → Pass to inner route table
//! ```
//!
//! # Design Decisions
//! - One gate, one audit record per request
//! - Fail closed: reject on any authentication failure
//! - No trust in client-supplied identity headers

pub mod auth_gate;
pub mod authenticator;
pub mod headers;

pub use auth_gate::AuthGate;
pub use authenticator::{AuthContext, AuthError, Authenticator, TokenAuthenticator};
