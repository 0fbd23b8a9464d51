//! # HTTP Server Module
//!
//! Axum server exposing the promotion controller.
//!
//! # Endpoints
//!
//! - `/`, `/health` - Banner and health check
//! - `/builds/*` - Build registration, gate reports, decisions
//! - `/observability/*` - Metrics and monitoring

pub mod config;
pub mod observability_routes;
pub mod promotion_routes;
pub mod server;

pub use config::HttpServerConfig;
pub use promotion_routes::AppState;
pub use server::HttpServer;
