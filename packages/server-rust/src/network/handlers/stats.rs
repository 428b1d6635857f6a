//! Aggregation read endpoints.

use axum::extract::State;
use axum::Json;
use orderflow_core::PriceStats;

use super::AppState;
use crate::dead_letter::DeadLetterView;

/// `GET /aggregation/stats`: always 200, zero-valued before the first order.
pub async fn stats_handler(State(state): State<AppState>) -> Json<PriceStats> {
    Json(state.stats.stats())
}

/// `GET /aggregation/dead-letters`: most recent dead letters, oldest first.
pub async fn dead_letters_handler(State(state): State<AppState>) -> Json<DeadLetterView> {
    Json(state.dead_letters.view())
}
