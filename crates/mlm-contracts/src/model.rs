// Catalog and runtime DTOs.

use serde::{Deserialize, Serialize};

/// Opaque-beyond-defaults classification of the inference engine behind a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Vllm,
    Trtllm,
    Ollama,
    Transformers,
    Other,
}

/// Declarative, catalog-loaded description of one model deployment.
///
/// Immutable for the lifetime of the process — the catalog is read once at
/// startup (see [`crate::error::ErrorKind`] for the reload Non-goal).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub display_name: String,
    pub engine_kind: EngineKind,
    pub endpoint_port: u16,
    pub container_name: String,
    pub start_command: Vec<String>,
    #[serde(default)]
    pub stop_command: Vec<String>,
    #[serde(default)]
    pub estimated_memory_gb: Option<f64>,
    #[serde(default)]
    pub max_context_tokens: u32,
    #[serde(default)]
    pub supports_tools: bool,
    #[serde(default)]
    pub tool_call_parser: Option<String>,
    #[serde(default = "default_startup_timeout_seconds")]
    pub startup_timeout_seconds: u64,
    #[serde(default = "default_health_probe_interval_seconds")]
    pub health_probe_interval_seconds: u64,
}

fn default_startup_timeout_seconds() -> u64 {
    600
}

fn default_health_probe_interval_seconds() -> u64 {
    5
}

/// Lifecycle state of a [`ModelSpec`]'s runtime record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// In-flight startup progress, only present while `state == Starting`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupProgress {
    pub elapsed_s: u64,
    pub timeout_s: u64,
    pub health_checks: u32,
    pub progress_percent: u8,
}

/// Read-only snapshot of one `ModelRuntime`, returned by `list`/`get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeView {
    pub id: String,
    pub name: String,
    pub engine: EngineKind,
    pub port: u16,
    pub container_name: String,
    pub status: ModelState,
    pub memory_mb: Option<u64>,
    pub estimated_memory_gb: Option<f64>,
    pub max_context_length: Option<u32>,
    pub supports_tools: bool,
    pub tool_call_parser: Option<String>,
    pub startup_progress: Option<StartupProgress>,
    pub last_failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_spec_defaults_from_minimal_json() {
        let json = r#"{
            "id": "m1",
            "display_name": "Model One",
            "engine_kind": "vllm",
            "endpoint_port": 8100,
            "container_name": "c1",
            "start_command": ["noop-start", "c1"]
        }"#;

        let spec: ModelSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.startup_timeout_seconds, 600);
        assert_eq!(spec.health_probe_interval_seconds, 5);
        assert!(spec.stop_command.is_empty());
        assert_eq!(spec.estimated_memory_gb, None);
    }
}
