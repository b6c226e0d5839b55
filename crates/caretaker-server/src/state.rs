//! Shared application state.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! handlers via `Arc`. The last-seen and proxy-target maps are in-process
//! hints; the container runtime remains the source of truth for tenant
//! state, and both maps are rebuilt from it on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use caretaker_core::central::CentralStore;
use caretaker_core::naming::TenantNamer;
use caretaker_core::revocation::RevocationStore;
use caretaker_core::session::SessionStore;
use caretaker_runtime::{ContainerRuntime, Provisioner, TenantSpec};

use crate::config::ServerConfig;

/// Upstream dial timeout for proxied requests.
const PROXY_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long idle upstream connections are kept for reuse.
const PROXY_POOL_IDLE: Duration = Duration::from_secs(90);

/// Cached forwarding target for one tenant.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    /// Tenant IP on its dedicated network.
    pub ip: String,
    /// Tenant application port.
    pub port: u16,
}

impl ProxyTarget {
    /// Origin URL of the tenant application.
    #[must_use]
    pub fn origin(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Server configuration.
    pub config: ServerConfig,
    /// Session token issue/verify/renew/revoke.
    pub sessions: SessionStore,
    /// Revoked-token store (also probed by the readiness endpoint).
    pub revocations: Arc<dyn RevocationStore>,
    /// Central analytics store.
    pub central: CentralStore,
    /// Container runtime client.
    pub runtime: Arc<ContainerRuntime>,
    /// Tenant provisioner (warmup).
    pub provisioner: Provisioner,
    /// User → tenant key derivation.
    pub namer: TenantNamer,
    /// Most recent proxied-request time per tenant.
    pub last_seen: RwLock<HashMap<String, DateTime<Utc>>>,
    /// Cached proxy targets per tenant.
    pub proxy_targets: RwLock<HashMap<String, ProxyTarget>>,
    /// Shared upstream HTTP client for proxying.
    pub http: reqwest::Client,
}

impl AppState {
    /// Assemble the state from pre-built externals.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be constructed.
    pub fn new(
        config: ServerConfig,
        revocations: Arc<dyn RevocationStore>,
        central: CentralStore,
        runtime: Arc<ContainerRuntime>,
    ) -> anyhow::Result<Arc<Self>> {
        let sessions = SessionStore::new(
            &config.cookie_secret,
            config.session_ttl,
            config.renew_window,
            Arc::clone(&revocations),
        );
        let namer = TenantNamer::new(config.namespace_key.clone());
        let spec = TenantSpec {
            image: config.tenant_image.clone(),
            port: config.tenant_port,
            memory_gb: config.tenant_ram_gb,
            cpus: config.tenant_cpus,
            pids_limit: config.tenant_pids,
            env: config.tenant_env.clone(),
        };
        let provisioner = Provisioner::new(Arc::clone(&runtime), spec, config.health_wait);
        let http = reqwest::Client::builder()
            .connect_timeout(PROXY_CONNECT_TIMEOUT)
            .pool_idle_timeout(PROXY_POOL_IDLE)
            .build()?;

        Ok(Arc::new(Self {
            config,
            sessions,
            revocations,
            central,
            runtime,
            provisioner,
            namer,
            last_seen: RwLock::new(HashMap::new()),
            proxy_targets: RwLock::new(HashMap::new()),
            http,
        }))
    }

    /// Record proxied activity for a tenant.
    pub async fn touch(&self, tenant: &str) {
        self.last_seen
            .write()
            .await
            .insert(tenant.to_owned(), Utc::now());
    }

    /// Last proxied-request time for a tenant, if any since process start.
    pub async fn last_seen_of(&self, tenant: &str) -> Option<DateTime<Utc>> {
        self.last_seen.read().await.get(tenant).copied()
    }

    /// Forget a tenant's activity entry (reaper and admin stop).
    pub async fn clear_activity(&self, tenant: &str) {
        self.last_seen.write().await.remove(tenant);
    }

    /// Cache a tenant's forwarding target.
    pub async fn set_proxy_target(&self, tenant: &str, target: ProxyTarget) {
        self.proxy_targets
            .write()
            .await
            .insert(tenant.to_owned(), target);
    }

    /// Drop a tenant's cached forwarding target.
    pub async fn drop_proxy_target(&self, tenant: &str) {
        self.proxy_targets.write().await.remove(tenant);
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn proxy_target_origin() {
        let target = ProxyTarget {
            ip: "172.20.0.2".to_owned(),
            port: 8080,
        };
        assert_eq!(target.origin(), "http://172.20.0.2:8080");
    }

}
