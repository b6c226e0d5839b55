//! Error types for the container runtime layer.

/// Errors from container runtime operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The Docker Engine API returned an error.
    #[error("container runtime error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// No container exists for the tenant.
    #[error("tenant {tenant} not found")]
    NotFound { tenant: String },

    /// The container did not report healthy before the deadline.
    #[error("tenant {tenant} did not become healthy within {waited_secs}s")]
    HealthTimeout { tenant: String, waited_secs: u64 },

    /// The container has no address on its dedicated network.
    #[error("no address for tenant {tenant} on network {network}")]
    MissingAddress { tenant: String, network: String },
}

impl RuntimeError {
    /// Whether this error is a 404 from the daemon or an explicit not-found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Docker(bollard::errors::Error::DockerResponseServerError {
                status_code, ..
            }) => *status_code == 404,
            _ => false,
        }
    }
}
