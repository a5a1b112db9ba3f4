// ModelRuntime: the mutable, in-memory lifecycle record for one catalog entry.
//
// Two locks per runtime, deliberately not one:
//   - `action_lock` is held only for the duration of deciding whether a
//     start/stop may proceed; it is what makes concurrent start/stop calls
//     against the same model return `Busy` instead of racing (spec.md §5).
//   - `state` is a `tokio::sync::RwLock` so the `StartupSupervisor` background
//     task can update progress while callers read it for `list`/`get` without
//     holding `action_lock` for the whole startup window.
//
// Grounded on `everruns-worker`'s `InProcessRunner`, which tracks one
// `JoinHandle` and one cancel flag per session id in separate maps; here both
// live on the record itself since each runtime owns exactly one supervisor
// task at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mlm_contracts::{ModelSpec, ModelState, StartupProgress};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveOperation {
    None,
    Start,
    Stop,
}

/// Cooperative cancellation flag handed to a running `StartupSupervisor`.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub(crate) struct RuntimeState {
    pub state: ModelState,
    pub state_entered_at: Instant,
    pub start_deadline_at: Option<Instant>,
    pub health_checks_attempted: u32,
    pub last_failure_reason: Option<String>,
    pub active_operation: ActiveOperation,
    pub supervisor_cancel: Option<CancelFlag>,
    pub supervisor_handle: Option<JoinHandle<()>>,
}

impl RuntimeState {
    fn fresh() -> Self {
        Self {
            state: ModelState::Stopped,
            state_entered_at: Instant::now(),
            start_deadline_at: None,
            health_checks_attempted: 0,
            last_failure_reason: None,
            active_operation: ActiveOperation::None,
            supervisor_cancel: None,
            supervisor_handle: None,
        }
    }

    pub fn startup_progress(&self) -> Option<StartupProgress> {
        if self.state != ModelState::Starting {
            return None;
        }
        let timeout_s = self
            .start_deadline_at
            .map(|deadline| {
                deadline
                    .saturating_duration_since(self.state_entered_at)
                    .as_secs()
            })
            .unwrap_or(0);
        let elapsed_s = self.state_entered_at.elapsed().as_secs();
        let progress_percent = if timeout_s == 0 {
            0
        } else {
            ((elapsed_s.min(timeout_s) * 100) / timeout_s) as u8
        };
        Some(StartupProgress {
            elapsed_s,
            timeout_s,
            health_checks: self.health_checks_attempted,
            progress_percent,
        })
    }
}

/// One catalog entry plus its live lifecycle state.
pub struct ModelRuntime {
    pub spec: ModelSpec,
    pub(crate) action_lock: tokio::sync::Mutex<()>,
    pub(crate) state: RwLock<RuntimeState>,
}

impl ModelRuntime {
    pub fn new(spec: ModelSpec) -> Self {
        Self {
            spec,
            action_lock: tokio::sync::Mutex::new(()),
            state: RwLock::new(RuntimeState::fresh()),
        }
    }

    pub async fn snapshot_state(&self) -> ModelState {
        self.state.read().await.state
    }
}
