use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use scanner_lib::engine::{replay_source_from_env, ReconstructionEngine, ReplayEngine, UnsupportedEngine};
use scanner_lib::settings::ScannerSettings;
use scanner_lib::transfer::HttpTransport;
use scanner_lib::Scanner;
use tower_http::cors::CorsLayer;

mod routes;

const DEFAULT_BIND: &str = "0.0.0.0:3001";

#[derive(Clone)]
pub struct AppState {
    pub scanner: Arc<Scanner>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/status", get(routes::status))
        .route("/api/scan/start", post(routes::start_scan))
        .route("/api/scan/stop", post(routes::stop_scan))
        .route("/api/export", post(routes::export))
        .route("/api/upload", post(routes::upload))
        .route("/api/artifact", get(routes::artifact))
        .route("/api/command", post(routes::command))
        .route("/api/events", get(routes::events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scan_server=info,scanner_lib=info".into()),
        )
        .init();

    let settings = ScannerSettings::load();
    let engine: Arc<dyn ReconstructionEngine> = match replay_source_from_env() {
        Some(path) => Arc::new(ReplayEngine::from_path(&path)?),
        None => {
            tracing::warn!("SCANNER_REPLAY_SCENE not set; scanning is unavailable");
            Arc::new(UnsupportedEngine)
        }
    };
    let transport = Arc::new(HttpTransport::new(&settings.upload)?);
    let state = AppState {
        scanner: Arc::new(Scanner::new(engine, transport, settings)),
    };

    let bind = std::env::var("SCANNER_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Server running on http://{bind}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
