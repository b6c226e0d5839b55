//! Thin wrapper over the Docker Engine API.
//!
//! All ensure-* operations are list-then-create and safe to repeat. Start
//! and network-connect calls treat the daemon's "already done" responses as
//! success so warmup can be retried freely.

use std::collections::HashMap;
use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogsOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerInspectResponse, ContainerSummary, HealthStatusEnum};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, ListNetworksOptions};
use bollard::volume::{CreateVolumeOptions, ListVolumesOptions};
use bollard::Docker;
use futures_util::TryStreamExt;
use tracing::{debug, info};

use caretaker_core::naming::NETWORK_PREFIX;

use crate::ansi::strip_ansi;
use crate::error::RuntimeError;
use crate::spec::TENANT_LABEL;

/// Poll cadence of the health wait loop.
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Client for the container runtime.
pub struct ContainerRuntime {
    docker: Docker,
}

impl ContainerRuntime {
    /// Connect using the local daemon defaults (`DOCKER_HOST` or the unix
    /// socket). Construction is lazy; use [`ping`](Self::ping) to confirm the
    /// daemon is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Docker`] if the client cannot be constructed.
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Round-trip health probe against the daemon.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Docker`] if the daemon is unreachable.
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await?;
        Ok(())
    }

    /// Create the named bridge network if it does not exist.
    ///
    /// The network is attachable and not internal. Repeated calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Docker`] on list or create failure.
    pub async fn ensure_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_owned(), vec![name.to_owned()]);
        let existing = self
            .docker
            .list_networks(Some(ListNetworksOptions { filters }))
            .await?;

        // The name filter is a substring match; compare exactly.
        if existing.iter().any(|n| n.name.as_deref() == Some(name)) {
            return Ok(());
        }

        self.docker
            .create_network(CreateNetworkOptions {
                name: name.to_owned(),
                driver: "bridge".to_owned(),
                internal: false,
                attachable: true,
                ..Default::default()
            })
            .await?;
        info!(network = %name, "created tenant network");
        Ok(())
    }

    /// Create the named local-driver volume if it does not exist.
    ///
    /// Repeated calls are no-ops. Volumes are never deleted by the
    /// supervisor.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Docker`] on list or create failure.
    pub async fn ensure_volume(&self, name: &str) -> Result<(), RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_owned(), vec![name.to_owned()]);
        let existing = self
            .docker
            .list_volumes(Some(ListVolumesOptions { filters }))
            .await?;

        let present = existing
            .volumes
            .unwrap_or_default()
            .iter()
            .any(|v| v.name == name);
        if present {
            return Ok(());
        }

        self.docker
            .create_volume(CreateVolumeOptions {
                name: name.to_owned(),
                driver: "local".to_owned(),
                ..Default::default()
            })
            .await?;
        info!(volume = %name, "created tenant volume");
        Ok(())
    }

    /// Inspect a container by name; `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Docker`] for daemon errors other than 404.
    pub async fn inspect(
        &self,
        name: &str,
    ) -> Result<Option<ContainerInspectResponse>, RuntimeError> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => Ok(Some(response)),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the named container exists and is running.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Docker`] on inspection failure.
    pub async fn is_running(&self, name: &str) -> Result<bool, RuntimeError> {
        Ok(self
            .inspect(name)
            .await?
            .as_ref()
            .is_some_and(inspect_is_running))
    }

    /// Create a container with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Docker`] on create failure.
    pub async fn create_container(
        &self,
        name: &str,
        config: Config<String>,
    ) -> Result<(), RuntimeError> {
        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name,
                    platform: None,
                }),
                config,
            )
            .await?;
        info!(container = %name, "created tenant container");
        Ok(())
    }

    /// Start a container; already-running is success.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotFound`] if the container does not exist,
    /// [`RuntimeError::Docker`] otherwise.
    pub async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        match self
            .docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                debug!(container = %name, "container already started");
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(RuntimeError::NotFound {
                tenant: name.to_owned(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Connect a container to a network; already-connected is success.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Docker`] on failure.
    pub async fn connect_network(&self, network: &str, container: &str) -> Result<(), RuntimeError> {
        match self
            .docker
            .connect_network(
                network,
                ConnectNetworkOptions {
                    container: container.to_owned(),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(()) => Ok(()),
            // The daemon answers 403 when the endpoint already exists.
            Err(BollardError::DockerResponseServerError {
                status_code: 403, ..
            }) => {
                debug!(container = %container, network = %network, "already connected");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Gracefully stop a container with the given grace period.
    ///
    /// Already-stopped is success. The container record, volumes, and
    /// network are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotFound`] if the container does not exist,
    /// [`RuntimeError::Docker`] otherwise.
    pub async fn stop(&self, name: &str, grace: Duration) -> Result<(), RuntimeError> {
        let t = i64::try_from(grace.as_secs()).unwrap_or(10);
        match self
            .docker
            .stop_container(name, Some(StopContainerOptions { t }))
            .await
        {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(RuntimeError::NotFound {
                tenant: name.to_owned(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the last `tail` lines of combined stdout/stderr, ANSI-stripped.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotFound`] if the container does not exist,
    /// [`RuntimeError::Docker`] otherwise.
    pub async fn logs_tail(&self, name: &str, tail: u32) -> Result<String, RuntimeError> {
        let chunks: Vec<_> = self
            .docker
            .logs(
                name,
                Some(LogsOptions::<String> {
                    stdout: true,
                    stderr: true,
                    tail: tail.to_string(),
                    ..Default::default()
                }),
            )
            .try_collect()
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => RuntimeError::NotFound {
                    tenant: name.to_owned(),
                },
                other => other.into(),
            })?;

        let mut raw = String::new();
        for chunk in chunks {
            raw.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
        }
        Ok(strip_ansi(&raw))
    }

    /// List all containers (running or not) carrying the tenant label.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Docker`] on list failure.
    pub async fn list_tenants(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_owned(), vec![TENANT_LABEL.to_owned()]);
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;
        Ok(containers)
    }

    /// Poll inspection until the container reports healthy, then return its
    /// address on `network`.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::HealthTimeout`] if `deadline` passes first.
    /// - [`RuntimeError::MissingAddress`] if healthy but unaddressed.
    /// - [`RuntimeError::NotFound`] if the container disappears.
    pub async fn wait_healthy(
        &self,
        tenant: &str,
        network: &str,
        deadline: Duration,
    ) -> Result<String, RuntimeError> {
        let started = tokio::time::Instant::now();
        loop {
            let inspect = self
                .inspect(tenant)
                .await?
                .ok_or_else(|| RuntimeError::NotFound {
                    tenant: tenant.to_owned(),
                })?;

            if inspect_is_healthy(&inspect) {
                return address_on(&inspect, network).ok_or_else(|| {
                    RuntimeError::MissingAddress {
                        tenant: tenant.to_owned(),
                        network: network.to_owned(),
                    }
                });
            }

            if started.elapsed() >= deadline {
                return Err(RuntimeError::HealthTimeout {
                    tenant: tenant.to_owned(),
                    waited_secs: deadline.as_secs(),
                });
            }

            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }
    }
}

impl std::fmt::Debug for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerRuntime").finish_non_exhaustive()
    }
}

/// Whether an inspect response reports the container running.
#[must_use]
pub fn inspect_is_running(inspect: &ContainerInspectResponse) -> bool {
    inspect
        .state
        .as_ref()
        .is_some_and(|s| s.running == Some(true))
}

/// Whether an inspect response reports the container healthy.
#[must_use]
pub fn inspect_is_healthy(inspect: &ContainerInspectResponse) -> bool {
    matches!(
        inspect
            .state
            .as_ref()
            .and_then(|s| s.health.as_ref())
            .and_then(|h| h.status.as_ref()),
        Some(HealthStatusEnum::HEALTHY)
    )
}

/// The container's IP on the named network, if assigned.
#[must_use]
pub fn address_on(inspect: &ContainerInspectResponse, network: &str) -> Option<String> {
    inspect
        .network_settings
        .as_ref()?
        .networks
        .as_ref()?
        .get(network)?
        .ip_address
        .clone()
        .filter(|ip| !ip.is_empty())
}

/// The container's IP on its first tenant network (name prefixed `net__`).
#[must_use]
pub fn first_tenant_address(inspect: &ContainerInspectResponse) -> Option<String> {
    let networks = inspect.network_settings.as_ref()?.networks.as_ref()?;
    networks
        .iter()
        .filter(|(name, _)| name.starts_with(NETWORK_PREFIX))
        .find_map(|(_, endpoint)| endpoint.ip_address.clone().filter(|ip| !ip.is_empty()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bollard::models::{ContainerState, EndpointSettings, Health, NetworkSettings};

    fn inspect_with(
        running: bool,
        health: Option<HealthStatusEnum>,
        networks: Vec<(&str, &str)>,
    ) -> ContainerInspectResponse {
        let endpoints: HashMap<String, EndpointSettings> = networks
            .into_iter()
            .map(|(name, ip)| {
                (
                    name.to_owned(),
                    EndpointSettings {
                        ip_address: Some(ip.to_owned()),
                        ..Default::default()
                    },
                )
            })
            .collect();

        ContainerInspectResponse {
            state: Some(ContainerState {
                running: Some(running),
                health: health.map(|status| Health {
                    status: Some(status),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                networks: Some(endpoints),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn running_state_is_detected() {
        assert!(inspect_is_running(&inspect_with(true, None, vec![])));
        assert!(!inspect_is_running(&inspect_with(false, None, vec![])));
    }

    #[test]
    fn healthy_requires_the_healthy_status() {
        assert!(inspect_is_healthy(&inspect_with(
            true,
            Some(HealthStatusEnum::HEALTHY),
            vec![]
        )));
        assert!(!inspect_is_healthy(&inspect_with(
            true,
            Some(HealthStatusEnum::STARTING),
            vec![]
        )));
        assert!(!inspect_is_healthy(&inspect_with(true, None, vec![])));
    }

    #[test]
    fn address_is_read_from_the_named_network() {
        let inspect = inspect_with(true, None, vec![("net__app__x", "172.20.0.2")]);
        assert_eq!(
            address_on(&inspect, "net__app__x"),
            Some("172.20.0.2".to_owned())
        );
        assert_eq!(address_on(&inspect, "net__app__y"), None);
    }

    #[test]
    fn first_tenant_address_ignores_foreign_networks() {
        let inspect = inspect_with(
            true,
            None,
            vec![("bridge", "172.17.0.2"), ("net__app__x", "172.20.0.2")],
        );
        assert_eq!(first_tenant_address(&inspect), Some("172.20.0.2".to_owned()));
    }

    #[test]
    fn empty_ip_is_treated_as_unaddressed() {
        let inspect = inspect_with(true, None, vec![("net__app__x", "")]);
        assert_eq!(first_tenant_address(&inspect), None);
    }
}
