// StartupSupervisor: the per-start task owning `Starting -> {Running|Failed}`.
//
// Runs detached from the call that spawned it; `LifecycleEngine::start` never
// awaits this function. Every terminal transition re-acquires the runtime's
// action lock and re-checks the cancel flag immediately before committing, so
// a `stop` that races with the final health check always wins instead of
// bouncing the runtime back to `Running` after it was asked to stop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use mlm_contracts::ModelState;
use tracing::{info, warn};

use crate::container_driver::ContainerDriver;
use crate::health_prober::HealthProber;
use crate::runtime::{ActiveOperation, CancelFlag, ModelRuntime};

const PROBE_HOST: &str = "127.0.0.1";

/// Task-boundary wrapper: a panic anywhere in `run_supervisor_body` must never
/// tear down the process, and must never leave the runtime stuck in
/// `Starting`. Caught here and converted to `Failed`.
pub(crate) async fn run_supervisor(
    runtime: Arc<ModelRuntime>,
    driver: Arc<dyn ContainerDriver>,
    prober: Arc<dyn HealthProber>,
    cancel: CancelFlag,
) {
    let id = runtime.spec.id.clone();
    let guarded_runtime = runtime.clone();
    let guarded_cancel = cancel.clone();

    let result = AssertUnwindSafe(run_supervisor_body(runtime, driver, prober, cancel))
        .catch_unwind()
        .await;

    if let Err(panic) = result {
        let reason = panic_message(&panic);
        warn!(model = %id, reason = %reason, "supervisor task panicked");
        let _guard = guarded_runtime.action_lock.lock().await;
        if guarded_cancel.is_cancelled() {
            return;
        }
        let mut state = guarded_runtime.state.write().await;
        state.state = ModelState::Failed;
        state.last_failure_reason = Some(format!("supervisor panicked: {reason}"));
        state.active_operation = ActiveOperation::None;
        state.supervisor_cancel = None;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

async fn run_supervisor_body(
    runtime: Arc<ModelRuntime>,
    driver: Arc<dyn ContainerDriver>,
    prober: Arc<dyn HealthProber>,
    cancel: CancelFlag,
) {
    let id = runtime.spec.id.clone();

    if let Err(e) = driver.start(&runtime.spec).await {
        let _guard = runtime.action_lock.lock().await;
        if cancel.is_cancelled() {
            return;
        }
        warn!(model = %id, error = %e, "container start failed");
        let mut state = runtime.state.write().await;
        state.state = ModelState::Failed;
        state.last_failure_reason = Some(format!("start failed: {e}"));
        state.active_operation = ActiveOperation::None;
        state.supervisor_cancel = None;
        return;
    }

    let interval = Duration::from_secs(runtime.spec.health_probe_interval_seconds.max(1));

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let deadline = runtime.state.read().await.start_deadline_at;
        if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
            let _guard = runtime.action_lock.lock().await;
            if cancel.is_cancelled() {
                return;
            }
            warn!(model = %id, "startup deadline exceeded");
            let _ = driver.stop(&runtime.spec).await;
            let mut state = runtime.state.write().await;
            state.state = ModelState::Failed;
            state.last_failure_reason = Some("startup_timeout".to_string());
            state.active_operation = ActiveOperation::None;
            state.supervisor_cancel = None;
            return;
        }

        {
            let mut state = runtime.state.write().await;
            state.health_checks_attempted += 1;
        }

        let outcome = prober.probe(PROBE_HOST, runtime.spec.endpoint_port).await;
        if outcome.is_ok() {
            let _guard = runtime.action_lock.lock().await;
            if cancel.is_cancelled() {
                return;
            }
            info!(model = %id, "model became healthy");
            let mut state = runtime.state.write().await;
            state.state = ModelState::Running;
            state.active_operation = ActiveOperation::None;
            state.supervisor_cancel = None;
            return;
        }

        tokio::time::sleep(interval).await;
    }
}
