//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, raw path)
//!     → router.rs (ordered scan by priority tier, then insertion order)
//!     → matcher.rs (exact / templated / prefix comparison)
//!     → Return: matched handler, 405, or NotFound handler
//!
//! Route Compilation (at startup):
//!     register_exact / register_prefix calls
//!     → Stable sort by priority tier
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First match wins; more specific patterns get no implicit preference

pub mod handler;
pub mod matcher;
pub mod router;

pub use handler::Handler;
pub use matcher::{MatchKind, PathParams, Pattern};
pub use router::{MatchedRoute, RouteEntry, RouteMatch, RouteTable, RouteTableBuilder};
