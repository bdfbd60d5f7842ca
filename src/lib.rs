//! Front door router for the cluster-management control plane.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod security;
pub mod tunnel;
pub mod ui;

pub use config::RouterConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
