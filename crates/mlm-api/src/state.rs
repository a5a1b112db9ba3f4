use std::sync::Arc;

use mlm_core::LifecycleEngine;
use mlm_orchestrator::ToolOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub orchestrator: Arc<ToolOrchestrator>,
}
