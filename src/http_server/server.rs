//! # HTTP Server
//!
//! Combines the promotion and observability routers behind CORS,
//! request tracing and panic isolation.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::config::HttpServerConfig;
use super::observability_routes::{health_routes, observability_routes};
use super::promotion_routes::{promotion_routes, AppState};
use crate::observability::{log_event_with_detail, Event};

/// HTTP server for the promotion controller
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: Arc<AppState>) -> Self {
        let router = Self::build_router(&config, state);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    fn build_router(config: &HttpServerConfig, state: Arc<AppState>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(health_routes(state.clone()))
            .nest("/builds", promotion_routes(state.clone()))
            .nest("/observability", observability_routes(state))
            // A panicking handler fails its own request only
            .layer(CatchPanicLayer::new())
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn start<F>(self, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr).await?;

        let bound = listener.local_addr()?;
        log_event_with_detail(Event::ServerListening, &bound.to_string());

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
