//! Tenant endpoints: warmup, status, listing, logs, forced stop.
//!
//! Warmup and status take a user id and resolve the tenant key themselves;
//! they sit on the internal plane alongside the admin endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::AppError;
use crate::reaper::STOP_GRACE;
use crate::state::{AppState, ProxyTarget};

/// Lines of log tail served by the logs endpoint.
const LOG_TAIL_LINES: u32 = 1000;

/// Build the tenant router (everything except `/warmup`, which carries its
/// own concurrency layer).
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(status))
        .route("/tenants", get(list_tenants))
        .route("/tenants/{user_id}/logs", get(tenant_logs))
        .route("/tenants/{user_id}/stop", post(stop_tenant))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WarmupRequest {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct TenantRow {
    #[serde(rename = "Container")]
    container: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "LastSeen")]
    last_seen: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Ensure a user's tenant is provisioned, running, and healthy.
pub async fn warmup(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let request: WarmupRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid warmup body: {e}")))?;
    let user_id = request
        .user_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest("user_id is required".to_owned()))?;

    let tenant = state.namer.tenant_key(&user_id);
    let ip = state
        .provisioner
        .warmup(&tenant, &user_id)
        .await
        .map_err(|e| {
            error!(tenant = %tenant, error = %e, "warmup failed");
            AppError::WarmupFailed(e.to_string())
        })?;

    // The health wait just observed this address; prime the proxy cache.
    state
        .set_proxy_target(
            &tenant,
            ProxyTarget {
                ip,
                port: state.config.tenant_port,
            },
        )
        .await;

    Ok(Json(serde_json::json!({"tenant": tenant, "state": "running"})))
}

/// Report whether a user's tenant container is running. No side effects.
async fn status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = query
        .user_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest("user_id is required".to_owned()))?;

    let tenant = state.namer.tenant_key(&user_id);
    let running = state
        .runtime
        .is_running(&tenant)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(serde_json::json!({"tenant": tenant, "running": running})))
}

/// List every tenant container known to the runtime.
async fn list_tenants(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TenantRow>>, AppError> {
    let containers = state
        .runtime
        .list_tenants()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut rows = Vec::with_capacity(containers.len());
    for summary in containers {
        let container = summary
            .names
            .unwrap_or_default()
            .first()
            .map(|name| name.trim_start_matches('/').to_owned())
            .unwrap_or_default();
        let last_seen = state
            .last_seen_of(&container)
            .await
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        rows.push(TenantRow {
            container,
            state: summary.state.unwrap_or_default(),
            last_seen,
        });
    }

    Ok(Json(rows))
}

/// Serve the tail of a tenant's combined stdout/stderr, ANSI-stripped.
async fn tenant_logs(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let tenant = state.namer.tenant_key(&user_id);
    let logs = state
        .runtime
        .logs_tail(&tenant, LOG_TAIL_LINES)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                AppError::NotFound(format!("no container for tenant {tenant}"))
            } else {
                AppError::Internal(e.to_string())
            }
        })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        logs,
    ))
}

/// Stop a tenant's container. Volumes and network are preserved.
async fn stop_tenant(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tenant = state.namer.tenant_key(&user_id);
    state.runtime.stop(&tenant, STOP_GRACE).await.map_err(|e| {
        if e.is_not_found() {
            AppError::NotFound(format!("no container for tenant {tenant}"))
        } else {
            error!(tenant = %tenant, error = %e, "admin stop failed");
            AppError::Internal(e.to_string())
        }
    })?;

    // A hand-stopped tenant is cold: forget its activity and cached address
    // so the reaper skips it and the next warmup re-resolves.
    state.clear_activity(&tenant).await;
    state.drop_proxy_target(&tenant).await;

    Ok(Json(serde_json::json!({"tenant": tenant, "state": "stopped"})))
}
