//! Router assembly.
//!
//! Dispatch order: exact paths (health, auth, warmup/status, admin tenants,
//! ingest) are matched first; every other path falls through to the
//! session-gated reverse proxy. Security response headers apply to the
//! supervisor's own routes only — proxied tenant responses pass through
//! verbatim.

pub mod auth;
pub mod health;
pub mod ingest;
pub mod tenants;

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::routing::post;
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::proxy;
use crate::state::AppState;

/// Concurrent warmups admitted before requests queue.
const WARMUP_CONCURRENCY: usize = 8;

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    // Provisioning fan-in guard, on top of the per-tenant lock.
    let warmup = Router::new()
        .route("/warmup", post(tenants::warmup))
        .layer(ConcurrencyLimitLayer::new(WARMUP_CONCURRENCY));

    let api = Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(warmup)
        .merge(tenants::router())
        .merge(ingest::router())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    Router::new()
        .merge(api)
        .fallback(proxy::handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
