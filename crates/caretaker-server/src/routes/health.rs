//! Liveness and readiness endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::state::AppState;

/// Probe budget for the dependency checks.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Build the health router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(health))
}

/// Report process liveness and dependency reachability.
///
/// The endpoint itself never fails; degraded dependencies are reported in
/// the body.
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let redis_ok = matches!(
        tokio::time::timeout(PROBE_TIMEOUT, state.revocations.ping()).await,
        Ok(Ok(()))
    );
    let central_db_ok = state.central.health().await;

    Json(serde_json::json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339(),
        "redis_ok": redis_ok,
        "central_db_ok": central_db_ok,
    }))
}
