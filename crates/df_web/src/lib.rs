use std::future::Future;
use std::net::SocketAddr;

use axum::{routing::get, Router};
use df_core::Result;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod handlers;
pub mod state;

pub use state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    pub bind: SocketAddr,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/actuator/health", get(handlers::health))
        .route("/api/status", get(handlers::pipeline_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the health and status endpoints until `shutdown` resolves.
pub async fn serve<F>(config: &WebConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("🌐 Health endpoint listening on http://{}", listener.local_addr()?);
    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub mod prelude {
    pub use super::{create_app, serve, AppState, WebConfig};
}
