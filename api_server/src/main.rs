use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use config_manager::SystemConfig;
use history_service::{HistoryError, TransactionHistoryService};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

mod handlers;
mod types;

use handlers::*;
use types::*;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub history: Arc<TransactionHistoryService>,
    pub started_at: Instant,
}

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    History(#[from] HistoryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::History(HistoryError::Configuration(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::History(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            timestamp: chrono::Utc::now(),
        });

        (status, body).into_response()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,api_server=debug,history_service=debug".into()),
        )
        .init();

    info!("Starting Safe transaction history API server...");

    let config = SystemConfig::load()?;
    info!("Configuration loaded successfully");

    let history = Arc::new(TransactionHistoryService::from_config(&config)?);
    info!("Transaction history service initialized");

    spawn_cache_purger(history.clone(), Duration::from_secs(config.cache.ttl_seconds));

    let app_state = AppState {
        history,
        started_at: Instant::now(),
    };
    let app = create_router(app_state);

    info!("📋 Available endpoints:");
    info!("   • GET /health - Health check");
    info!("   • GET /api/v1/chains/:chain_id/safes/:address/transactions - Safe transaction history");
    info!("   • GET /api/v1/cache/stats - Cache counters");

    let bind_addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("🚀 Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Drop expired cache entries once per TTL so idle wallets do not pile up.
fn spawn_cache_purger(history: Arc<TransactionHistoryService>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = history.purge_expired().await;
            debug!("Cache purge removed {} entries", purged);
        }
    });
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/v1/chains/:chain_id/safes/:address/transactions",
            get(get_safe_transactions),
        )
        .route("/api/v1/cache/stats", get(get_cache_stats))
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(state)
}
