//! Tenant container specification.
//!
//! Builds the create-time configuration for a tenant container: image,
//! environment, exposed port, in-container health probe, resource caps,
//! dropped capabilities, persistent volume binds, and the dedicated network.

use std::collections::HashMap;

use bollard::container::Config;
use bollard::models::{HealthConfig, HostConfig};

use caretaker_core::naming;

/// In-container root of per-user file trees.
pub const FILES_MOUNT_ROOT: &str = "/app/data/users";

/// In-container mount point of the conversation-history volume.
pub const HISTORY_MOUNT: &str = "/app/data/db";

const GIB: i64 = 1024 * 1024 * 1024;
const NANO_CPUS_PER_CORE: i64 = 1_000_000_000;

/// Healthcheck probe cadence: every 2s, 1s timeout, 15 retries.
const HEALTH_INTERVAL_NS: i64 = 2_000_000_000;
const HEALTH_TIMEOUT_NS: i64 = 1_000_000_000;
const HEALTH_RETRIES: i64 = 15;

/// Label key identifying tenant containers.
pub const TENANT_LABEL: &str = "tenant";

/// Fixed per-tenant container settings, taken from configuration.
#[derive(Debug, Clone)]
pub struct TenantSpec {
    /// Tenant application image.
    pub image: String,
    /// TCP port the tenant application listens on.
    pub port: u16,
    /// Memory cap in whole GiB.
    pub memory_gb: i64,
    /// CPU cap in whole cores.
    pub cpus: i64,
    /// PIDs cap.
    pub pids_limit: i64,
    /// Extra environment (upstream API keys and the like).
    pub env: Vec<(String, String)>,
}

impl TenantSpec {
    /// Build the container create configuration for one tenant.
    #[must_use]
    pub fn container_config(&self, tenant: &str, user_id: &str) -> Config<String> {
        let mut env: Vec<String> = vec![format!("USER_ID={user_id}"), format!("PORT={}", self.port)];
        env.extend(self.env.iter().map(|(k, v)| format!("{k}={v}")));

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(format!("{}/tcp", self.port), HashMap::new());

        let mut labels = HashMap::new();
        labels.insert(TENANT_LABEL.to_owned(), tenant.to_owned());

        let healthcheck = HealthConfig {
            test: Some(vec![
                "CMD-SHELL".to_owned(),
                format!("curl -fsS http://127.0.0.1:{}/health || exit 1", self.port),
            ]),
            interval: Some(HEALTH_INTERVAL_NS),
            timeout: Some(HEALTH_TIMEOUT_NS),
            retries: Some(HEALTH_RETRIES),
            ..Default::default()
        };

        let host_config = HostConfig {
            memory: Some(self.memory_gb * GIB),
            nano_cpus: Some(self.cpus * NANO_CPUS_PER_CORE),
            pids_limit: Some(self.pids_limit),
            cap_drop: Some(vec!["ALL".to_owned()]),
            binds: Some(vec![
                format!(
                    "{}:{FILES_MOUNT_ROOT}/{user_id}/files",
                    naming::files_volume(tenant)
                ),
                format!("{}:{HISTORY_MOUNT}", naming::history_volume(tenant)),
            ]),
            network_mode: Some(naming::network_name(tenant)),
            ..Default::default()
        };

        Config {
            image: Some(self.image.clone()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            labels: Some(labels),
            healthcheck: Some(healthcheck),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn spec() -> TenantSpec {
        TenantSpec {
            image: "tenant-app:latest".to_owned(),
            port: 8080,
            memory_gb: 2,
            cpus: 1,
            pids_limit: 256,
            env: vec![("UPSTREAM_API_KEY".to_owned(), "k".to_owned())],
        }
    }

    #[test]
    fn resource_caps_are_applied() {
        let config = spec().container_config("app__abc123def456", "u-1");
        let host = config.host_config.unwrap();
        assert_eq!(host.memory, Some(2 * GIB));
        assert_eq!(host.nano_cpus, Some(NANO_CPUS_PER_CORE));
        assert_eq!(host.pids_limit, Some(256));
        assert_eq!(host.cap_drop, Some(vec!["ALL".to_owned()]));
    }

    #[test]
    fn volumes_bind_to_fixed_paths() {
        let config = spec().container_config("app__abc123def456", "u-1");
        let binds = config.host_config.unwrap().binds.unwrap();
        assert!(binds.contains(&"vol__app__abc123def456__files:/app/data/users/u-1/files".to_owned()));
        assert!(binds.contains(&"vol__app__abc123def456__history:/app/data/db".to_owned()));
    }

    #[test]
    fn container_joins_its_own_network() {
        let config = spec().container_config("app__abc123def456", "u-1");
        assert_eq!(
            config.host_config.unwrap().network_mode,
            Some("net__app__abc123def456".to_owned())
        );
    }

    #[test]
    fn healthcheck_probes_the_exposed_port() {
        let config = spec().container_config("app__abc123def456", "u-1");
        let health = config.healthcheck.unwrap();
        let test = health.test.unwrap();
        assert_eq!(test[0], "CMD-SHELL");
        assert!(test[1].contains("http://127.0.0.1:8080/health"));
        assert_eq!(health.interval, Some(2_000_000_000));
        assert_eq!(health.timeout, Some(1_000_000_000));
        assert_eq!(health.retries, Some(15));
    }

    #[test]
    fn environment_carries_user_id_and_upstream_keys() {
        let config = spec().container_config("app__abc123def456", "u-1");
        let env = config.env.unwrap();
        assert!(env.contains(&"USER_ID=u-1".to_owned()));
        assert!(env.contains(&"UPSTREAM_API_KEY=k".to_owned()));
    }

    #[test]
    fn container_is_labelled_with_its_tenant() {
        let config = spec().container_config("app__abc123def456", "u-1");
        let labels = config.labels.unwrap();
        assert_eq!(labels.get(TENANT_LABEL), Some(&"app__abc123def456".to_owned()));
    }
}
