//! Idempotent tenant provisioning.
//!
//! Warmup ensures the tenant's network, volumes, and container exist, starts
//! the container, and gates on the health signal. Concurrent warmups for the
//! same tenant serialize on a keyed lock held across the whole sequence, so
//! no duplicate containers are created and racing callers observe either the
//! same success or the same class of failure. Warmups for different tenants
//! proceed in parallel.
//!
//! Nothing is cleaned up on failure: volumes and networks are safe to leave
//! behind, and a half-created container is retried by the next warmup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;

use caretaker_core::naming;

use crate::error::RuntimeError;
use crate::runtime::ContainerRuntime;
use crate::spec::TenantSpec;

/// Provisions tenant resources and warms containers.
pub struct Provisioner {
    runtime: Arc<ContainerRuntime>,
    spec: TenantSpec,
    health_deadline: Duration,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Provisioner {
    #[must_use]
    pub fn new(runtime: Arc<ContainerRuntime>, spec: TenantSpec, health_deadline: Duration) -> Self {
        Self {
            runtime,
            spec,
            health_deadline,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The per-tenant container port.
    #[must_use]
    pub fn tenant_port(&self) -> u16 {
        self.spec.port
    }

    /// Lock guarding provisioning of one tenant.
    async fn tenant_lock(&self, tenant: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(tenant.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Ensure the tenant is provisioned, started, and healthy.
    ///
    /// Returns the container's IP on its dedicated network.
    ///
    /// # Errors
    ///
    /// Any create/start failure or health-wait timeout fails this warmup
    /// attempt; the caller maps it to a 503. No partial cleanup is performed.
    pub async fn warmup(&self, tenant: &str, user_id: &str) -> Result<String, RuntimeError> {
        let lock = self.tenant_lock(tenant).await;
        let _guard = lock.lock().await;

        let network = naming::network_name(tenant);
        self.runtime.ensure_network(&network).await?;
        self.runtime
            .ensure_volume(&naming::files_volume(tenant))
            .await?;
        self.runtime
            .ensure_volume(&naming::history_volume(tenant))
            .await?;

        match self.runtime.inspect(tenant).await? {
            None => {
                let config = self.spec.container_config(tenant, user_id);
                self.runtime.create_container(tenant, config).await?;
            }
            Some(_) => {
                // Recreated networks can drop endpoints; reattach is a no-op
                // when the container is already connected.
                self.runtime.connect_network(&network, tenant).await?;
            }
        }

        self.runtime.start(tenant).await?;
        let ip = self
            .runtime
            .wait_healthy(tenant, &network, self.health_deadline)
            .await?;

        info!(tenant = %tenant, ip = %ip, "tenant warm and healthy");
        Ok(ip)
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("spec", &self.spec)
            .field("health_deadline", &self.health_deadline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn provisioner() -> Provisioner {
        let runtime = Arc::new(ContainerRuntime::connect().unwrap());
        Provisioner::new(
            runtime,
            TenantSpec {
                image: "tenant-app:latest".to_owned(),
                port: 8080,
                memory_gb: 1,
                cpus: 1,
                pids_limit: 128,
                env: vec![],
            },
            Duration::from_secs(45),
        )
    }

    #[tokio::test]
    async fn same_tenant_shares_one_lock() {
        let p = provisioner();
        let a = p.tenant_lock("app__1").await;
        let b = p.tenant_lock("app__1").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn different_tenants_get_distinct_locks() {
        let p = provisioner();
        let a = p.tenant_lock("app__1").await;
        let b = p.tenant_lock("app__2").await;
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
