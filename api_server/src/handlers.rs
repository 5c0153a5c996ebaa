use crate::types::*;
use crate::{ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use tracing::info;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(SuccessResponse::new(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        supported_chains: state.history.supported_chains(),
    }))
}

/// Paginated, newest-first history of one Safe
pub async fn get_safe_transactions(
    State(state): State<AppState>,
    Path((chain_id, address)): Path<(u64, String)>,
    Query(query): Query<TransactionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    info!(
        "Transaction history request: safe={}, chain={}, limit={}, offset={}",
        address, chain_id, limit, offset
    );

    let records = state
        .history
        .get_transactions(&address, chain_id, limit, offset)
        .await?;

    Ok(Json(SuccessResponse::new(records)))
}

/// Cache counters
pub async fn get_cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(SuccessResponse::new(state.history.cache_stats().await))
}
