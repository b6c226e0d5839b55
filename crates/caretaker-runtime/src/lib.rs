//! Container runtime layer for caretaker.
//!
//! Wraps the Docker Engine API behind the operations the supervisor needs:
//! idempotent ensure-network/volume/container, start/stop, health-gated
//! warmup, log retrieval, and tenant listing. The runtime is the source of
//! truth for container state; in-process maps elsewhere are hints rebuilt
//! from it on demand.

pub mod ansi;
pub mod error;
pub mod provisioner;
pub mod runtime;
pub mod spec;

pub use error::RuntimeError;
pub use provisioner::Provisioner;
pub use runtime::ContainerRuntime;
pub use spec::TenantSpec;
