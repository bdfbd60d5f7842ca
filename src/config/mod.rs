//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → consumed once at bootstrap
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → proxy allow-list swapped atomically
//! ```
//!
//! # Design Decisions
//! - The route table is never rebuilt; only the allow-list is live
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AllowListConfig, AuditConfig, ListenerConfig, ObservabilityConfig, RouterConfig, TlsConfig,
    TokenConfig, TunnelConfig, TunnelTokenConfig, UpstreamsConfig,
};
