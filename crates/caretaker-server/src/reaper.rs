//! Idle tenant reaper.
//!
//! A background worker that stops tenant containers whose last proxied
//! request is older than the idle threshold. Only the container is stopped —
//! volumes, network, and the container record survive, so the next warmup
//! restarts rather than recreates. Tenants with no activity entry (cold
//! since process start) are never touched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::state::AppState;

/// Grace period for container stops before the runtime escalates.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

/// Run the reaper until shutdown is signalled.
pub async fn run(state: Arc<AppState>, shutdown: &mut watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(state.config.reaper_interval);
    info!(
        interval_secs = state.config.reaper_interval.as_secs(),
        idle_secs = state.config.idle_threshold.as_secs(),
        "idle reaper started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sweep(&state, Utc::now()).await;
            }
            _ = shutdown.changed() => {
                info!("idle reaper shutting down");
                return;
            }
        }
    }
}

/// One reaper pass at time `now`.
///
/// Errors are logged and the entry retried on the next pass; the loop never
/// dies on a runtime failure.
pub async fn sweep(state: &AppState, now: DateTime<Utc>) {
    let idle = {
        let last_seen = state.last_seen.read().await;
        idle_tenants(&last_seen, now, state.config.idle_threshold)
    };

    for tenant in idle {
        match state.runtime.stop(&tenant, STOP_GRACE).await {
            Ok(()) => {
                state.clear_activity(&tenant).await;
                state.drop_proxy_target(&tenant).await;
                info!(tenant = %tenant, "stopped idle tenant");
            }
            Err(e) if e.is_not_found() => {
                // Stopped and removed out-of-band; forget it.
                state.clear_activity(&tenant).await;
                state.drop_proxy_target(&tenant).await;
            }
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "failed to stop idle tenant, will retry");
            }
        }
    }
}

/// Tenants whose last activity is older than `now - threshold`.
fn idle_tenants(
    last_seen: &HashMap<String, DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> Vec<String> {
    last_seen
        .iter()
        .filter(|(_, seen)| now.signed_duration_since(**seen).to_std().ok() > Some(threshold))
        .map(|(tenant, _)| tenant.clone())
        .collect()
}
