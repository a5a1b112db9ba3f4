// ContainerDriver: a narrow abstraction over the container runtime.
//
// LifecycleEngine and StartupSupervisor never shell out themselves — they go
// through this trait, so the real backend (mlm-driver) can be swapped for a
// fake in tests without touching orchestration logic.

use async_trait::async_trait;
use mlm_contracts::ModelSpec;

/// OS-level status of one named container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInspection {
    pub present: bool,
    pub running: bool,
    pub status_line: String,
    pub ports: String,
}

impl ContainerInspection {
    pub fn absent() -> Self {
        Self {
            present: false,
            running: false,
            status_line: String::new(),
            ports: String::new(),
        }
    }
}

/// Three operations: inspect, start, stop. Errors are never retried inside
/// the driver — `LifecycleEngine` decides whether/when to retry.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    async fn inspect(&self, container_name: &str) -> anyhow::Result<ContainerInspection>;

    /// Get the runtime into existence; does not wait for application-level
    /// readiness. If a stopped container with the same name exists it is
    /// removed first; an already-running container is treated as success.
    async fn start(&self, spec: &ModelSpec) -> anyhow::Result<()>;

    /// Runs `spec.stop_command` if non-empty, otherwise stops by container
    /// name.
    async fn stop(&self, spec: &ModelSpec) -> anyhow::Result<()>;
}
