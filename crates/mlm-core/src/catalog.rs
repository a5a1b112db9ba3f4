// Read-only, process-wide catalog of declared model deployments.
//
// Loaded once at startup from a single TOML file (see DESIGN.md for why TOML
// was picked over the repository's overlapping models.yaml/models.json
// precedent). Reloading at runtime is not implemented — the process is
// restarted to pick up catalog changes, as spec.md §4.2 allows.

use std::collections::HashMap;
use std::path::Path;

use mlm_contracts::ModelSpec;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    models: Vec<ModelSpec>,
}

/// Validated, read-only list of [`ModelSpec`]s.
#[derive(Debug, Clone)]
pub struct Catalog {
    by_id: HashMap<String, ModelSpec>,
    order: Vec<String>,
}

impl Catalog {
    /// Load and validate a catalog from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::BadRequest(format!("failed to read catalog {}: {e}", path.display())))?;
        let file: CatalogFile = toml::from_str(&raw)
            .map_err(|e| Error::BadRequest(format!("invalid catalog {}: {e}", path.display())))?;
        Self::from_specs(file.models)
    }

    /// Build and validate a catalog from an already-parsed list of specs.
    /// Exposed directly so tests can construct a catalog without touching disk.
    pub fn from_specs(models: Vec<ModelSpec>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(models.len());
        let mut seen_names = HashMap::new();
        let mut seen_ports = HashMap::new();
        let mut order = Vec::with_capacity(models.len());

        for spec in models {
            if spec.id.is_empty() {
                return Err(Error::BadRequest("model id must not be empty".into()));
            }
            if by_id.contains_key(&spec.id) {
                return Err(Error::BadRequest(format!("duplicate model id: {}", spec.id)));
            }
            if let Some(prev) = seen_names.insert(spec.container_name.clone(), spec.id.clone()) {
                return Err(Error::BadRequest(format!(
                    "container_name {} used by both {} and {}",
                    spec.container_name, prev, spec.id
                )));
            }
            if spec.endpoint_port == 0 {
                return Err(Error::BadRequest(format!(
                    "model {} has out-of-range endpoint_port 0",
                    spec.id
                )));
            }
            if let Some(prev) = seen_ports.insert(spec.endpoint_port, spec.id.clone()) {
                return Err(Error::BadRequest(format!(
                    "endpoint_port {} used by both {} and {}",
                    spec.endpoint_port, prev, spec.id
                )));
            }
            if spec.start_command.is_empty() {
                return Err(Error::BadRequest(format!(
                    "model {} has an empty start_command",
                    spec.id
                )));
            }
            if spec.startup_timeout_seconds == 0 {
                return Err(Error::BadRequest(format!(
                    "model {} has startup_timeout_seconds == 0",
                    spec.id
                )));
            }

            order.push(spec.id.clone());
            by_id.insert(spec.id.clone(), spec);
        }

        Ok(Self { by_id, order })
    }

    pub fn by_id(&self, id: &str) -> Option<&ModelSpec> {
        self.by_id.get(id)
    }

    /// All specs in catalog-declaration order.
    pub fn all(&self) -> Vec<&ModelSpec> {
        self.order.iter().filter_map(|id| self.by_id.get(id)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlm_contracts::EngineKind;

    fn spec(id: &str, port: u16, container: &str) -> ModelSpec {
        ModelSpec {
            id: id.to_string(),
            display_name: id.to_string(),
            engine_kind: EngineKind::Vllm,
            endpoint_port: port,
            container_name: container.to_string(),
            start_command: vec!["noop-start".to_string(), container.to_string()],
            stop_command: vec![],
            estimated_memory_gb: Some(20.0),
            max_context_tokens: 8192,
            supports_tools: true,
            tool_call_parser: None,
            startup_timeout_seconds: 30,
            health_probe_interval_seconds: 1,
        }
    }

    #[test]
    fn loads_valid_catalog() {
        let cat = Catalog::from_specs(vec![spec("m1", 8100, "c1"), spec("m2", 8101, "c2")]).unwrap();
        assert_eq!(cat.len(), 2);
        assert!(cat.by_id("m1").is_some());
        assert_eq!(cat.all().len(), 2);
    }

    #[test]
    fn rejects_duplicate_id() {
        let err = Catalog::from_specs(vec![spec("m1", 8100, "c1"), spec("m1", 8101, "c2")]).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn rejects_duplicate_port() {
        let err = Catalog::from_specs(vec![spec("m1", 8100, "c1"), spec("m2", 8100, "c2")]).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn rejects_duplicate_container_name() {
        let err = Catalog::from_specs(vec![spec("m1", 8100, "c1"), spec("m2", 8101, "c1")]).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[test]
    fn rejects_empty_start_command() {
        let mut s = spec("m1", 8100, "c1");
        s.start_command.clear();
        let err = Catalog::from_specs(vec![s]).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
