// LifecycleEngine: the central state machine. Owns every ModelRuntime,
// serializes start/stop per runtime via its action lock, and spawns the
// StartupSupervisor. Never blocks on external calls from `list`/`get`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mlm_contracts::{ModelState, RuntimeView};
use tracing::info;

use crate::catalog::Catalog;
use crate::container_driver::ContainerDriver;
use crate::error::{Error, Result};
use crate::health_prober::HealthProber;
use crate::memory_guard::{AdmitDecision, MemoryGuard};
use crate::runtime::{ActiveOperation, CancelFlag, ModelRuntime};
use crate::supervisor::run_supervisor;

pub struct LifecycleEngine {
    runtimes: HashMap<String, Arc<ModelRuntime>>,
    order: Vec<String>,
    driver: Arc<dyn ContainerDriver>,
    prober: Arc<dyn HealthProber>,
    memory_guard: MemoryGuard,
}

impl LifecycleEngine {
    pub fn new(
        catalog: &Catalog,
        driver: Arc<dyn ContainerDriver>,
        prober: Arc<dyn HealthProber>,
        memory_guard: MemoryGuard,
    ) -> Self {
        let mut runtimes = HashMap::new();
        let mut order = Vec::new();
        for spec in catalog.all() {
            order.push(spec.id.clone());
            runtimes.insert(spec.id.clone(), Arc::new(ModelRuntime::new(spec.clone())));
        }
        Self {
            runtimes,
            order,
            driver,
            prober,
            memory_guard,
        }
    }

    fn runtime(&self, id: &str) -> Result<&Arc<ModelRuntime>> {
        self.runtimes
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("no such model: {id}")))
    }

    /// Snapshot every runtime in catalog-declaration order. Never blocks on
    /// external I/O.
    pub async fn list(&self) -> Result<Vec<RuntimeView>> {
        if self.order.is_empty() {
            return Err(Error::BadRequest(
                "catalog is empty; no models configured".into(),
            ));
        }
        let mut views = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let runtime = &self.runtimes[id];
            views.push(to_view(runtime).await);
        }
        Ok(views)
    }

    pub async fn get(&self, id: &str) -> Result<RuntimeView> {
        let runtime = self.runtime(id)?;
        Ok(to_view(runtime).await)
    }

    /// Accepted on success (including idempotent no-ops); `Err` carries the
    /// rejection reason the HTTP layer maps to a 409.
    pub async fn start(&self, id: &str, force: bool) -> Result<()> {
        let runtime = self.runtime(id)?.clone();
        let _action_guard = runtime.action_lock.lock().await;

        {
            let state = runtime.state.read().await;
            match state.state {
                ModelState::Running => return Ok(()),
                ModelState::Starting | ModelState::Stopping => {
                    return Err(Error::Busy(format!("model {id} is busy")));
                }
                ModelState::Stopped | ModelState::Failed => {}
            }
        }

        let decision = self
            .memory_guard
            .admit(runtime.spec.estimated_memory_gb, force);
        if let AdmitDecision::Reject {
            available_gb,
            required_gb,
        } = decision
        {
            return Err(Error::InsufficientMemory {
                available_gb,
                required_gb,
            });
        }

        let cancel = CancelFlag::new();
        {
            let mut state = runtime.state.write().await;
            state.state = ModelState::Starting;
            state.state_entered_at = Instant::now();
            state.start_deadline_at =
                Some(Instant::now() + Duration::from_secs(runtime.spec.startup_timeout_seconds));
            state.health_checks_attempted = 0;
            state.last_failure_reason = None;
            state.active_operation = ActiveOperation::Start;
            state.supervisor_cancel = Some(cancel.clone());
        }

        info!(model = %id, force, "starting model");

        let task_runtime = runtime.clone();
        let task_driver = self.driver.clone();
        let task_prober = self.prober.clone();
        let task_cancel = cancel;
        let handle = tokio::spawn(async move {
            run_supervisor(task_runtime, task_driver, task_prober, task_cancel).await;
        });

        let mut state = runtime.state.write().await;
        state.supervisor_handle = Some(handle);

        Ok(())
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        let runtime = self.runtime(id)?.clone();
        let _action_guard = runtime.action_lock.lock().await;

        {
            let mut state = runtime.state.write().await;
            match state.state {
                ModelState::Stopped => return Ok(()),
                ModelState::Stopping => {
                    return Err(Error::Busy(format!("model {id} is already stopping")));
                }
                ModelState::Starting => {
                    if let Some(cancel) = &state.supervisor_cancel {
                        cancel.cancel();
                    }
                    state.state = ModelState::Stopping;
                    state.state_entered_at = Instant::now();
                    state.active_operation = ActiveOperation::Stop;
                }
                ModelState::Running | ModelState::Failed => {
                    state.state = ModelState::Stopping;
                    state.state_entered_at = Instant::now();
                    state.active_operation = ActiveOperation::Stop;
                }
            }
        }

        info!(model = %id, "stopping model");

        match self.driver.stop(&runtime.spec).await {
            Ok(()) => {
                let mut state = runtime.state.write().await;
                state.state = ModelState::Stopped;
                state.active_operation = ActiveOperation::None;
                state.supervisor_cancel = None;
                Ok(())
            }
            Err(e) => {
                let mut state = runtime.state.write().await;
                state.state = ModelState::Failed;
                state.last_failure_reason = Some(e.to_string());
                state.active_operation = ActiveOperation::None;
                state.supervisor_cancel = None;
                Err(Error::UpstreamUnavailable(format!(
                    "stop failed for {id}: {e}"
                )))
            }
        }
    }
}

async fn to_view(runtime: &ModelRuntime) -> RuntimeView {
    let state = runtime.state.read().await;
    RuntimeView {
        id: runtime.spec.id.clone(),
        name: runtime.spec.display_name.clone(),
        engine: runtime.spec.engine_kind,
        port: runtime.spec.endpoint_port,
        container_name: runtime.spec.container_name.clone(),
        status: state.state,
        memory_mb: None,
        estimated_memory_gb: runtime.spec.estimated_memory_gb,
        max_context_length: if runtime.spec.max_context_tokens > 0 {
            Some(runtime.spec.max_context_tokens)
        } else {
            None
        },
        supports_tools: runtime.spec.supports_tools,
        tool_call_parser: runtime.spec.tool_call_parser.clone(),
        startup_progress: state.startup_progress(),
        last_failure_reason: state.last_failure_reason.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeContainerDriver, FakeHealthProber};
    use mlm_contracts::EngineKind;

    fn spec(id: &str, timeout_s: u64, interval_s: u64) -> mlm_contracts::ModelSpec {
        mlm_contracts::ModelSpec {
            id: id.to_string(),
            display_name: id.to_string(),
            engine_kind: EngineKind::Vllm,
            endpoint_port: 8100,
            container_name: format!("{id}-container"),
            start_command: vec!["noop-start".to_string(), id.to_string()],
            stop_command: vec![],
            estimated_memory_gb: Some(20.0),
            max_context_tokens: 8192,
            supports_tools: true,
            tool_call_parser: None,
            startup_timeout_seconds: timeout_s,
            health_probe_interval_seconds: interval_s,
        }
    }

    fn engine_with(
        timeout_s: u64,
        interval_s: u64,
        driver: FakeContainerDriver,
        prober: FakeHealthProber,
    ) -> LifecycleEngine {
        let catalog = Catalog::from_specs(vec![spec("m1", timeout_s, interval_s)]).unwrap();
        LifecycleEngine::new(
            &catalog,
            Arc::new(driver),
            Arc::new(prober),
            MemoryGuard::new(),
        )
    }

    #[tokio::test]
    async fn cold_start_happy_path() {
        let engine = engine_with(
            30,
            1,
            FakeContainerDriver::default(),
            FakeHealthProber::failing_then_ok(2),
        );
        engine.start("m1", false).await.unwrap();
        assert_eq!(engine.get("m1").await.unwrap().status, ModelState::Starting);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(engine.get("m1").await.unwrap().status, ModelState::Running);
    }

    #[tokio::test]
    async fn start_on_running_is_idempotent() {
        let engine = engine_with(
            30,
            1,
            FakeContainerDriver::default(),
            FakeHealthProber::always_ok(),
        );
        engine.start("m1", false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(engine.get("m1").await.unwrap().status, ModelState::Running);
        engine.start("m1", false).await.unwrap();
    }

    #[tokio::test]
    async fn start_on_starting_is_rejected_busy() {
        let engine = engine_with(
            30,
            1,
            FakeContainerDriver::default(),
            FakeHealthProber::never_ok(),
        );
        engine.start("m1", false).await.unwrap();
        let err = engine.start("m1", false).await.unwrap_err();
        assert!(matches!(err, Error::Busy(_)));
    }

    #[tokio::test]
    async fn insufficient_memory_rejected_then_force_accepted() {
        let catalog = Catalog::from_specs(vec![{
            let mut s = spec("m1", 30, 1);
            s.estimated_memory_gb = Some(f64::MAX / 4.0);
            s
        }])
        .unwrap();
        let engine = LifecycleEngine::new(
            &catalog,
            Arc::new(FakeContainerDriver::default()),
            Arc::new(FakeHealthProber::always_ok()),
            MemoryGuard::new(),
        );

        let err = engine.start("m1", false).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientMemory { .. }));

        engine.start("m1", true).await.unwrap();
    }

    #[tokio::test]
    async fn startup_timeout_marks_failed() {
        let engine = engine_with(
            1,
            1,
            FakeContainerDriver::default(),
            FakeHealthProber::never_ok(),
        );
        engine.start("m1", false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1600)).await;
        let view = engine.get("m1").await.unwrap();
        assert_eq!(view.status, ModelState::Failed);
        assert_eq!(view.last_failure_reason.as_deref(), Some("startup_timeout"));
    }

    #[tokio::test]
    async fn cancel_during_starting_stops_without_running() {
        let engine = engine_with(
            30,
            1,
            FakeContainerDriver::default(),
            FakeHealthProber::never_ok(),
        );
        engine.start("m1", false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        engine.stop("m1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let view = engine.get("m1").await.unwrap();
        assert_ne!(view.status, ModelState::Running);
    }

    #[tokio::test]
    async fn stop_on_stopped_is_idempotent() {
        let engine = engine_with(
            30,
            1,
            FakeContainerDriver::default(),
            FakeHealthProber::always_ok(),
        );
        engine.stop("m1").await.unwrap();
        engine.stop("m1").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_model_not_found() {
        let engine = engine_with(
            30,
            1,
            FakeContainerDriver::default(),
            FakeHealthProber::always_ok(),
        );
        let err = engine.start("does-not-exist", false).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
