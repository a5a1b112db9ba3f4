// Shared test fakes for ContainerDriver and HealthProber.
//
// Kept behind a feature flag (rather than `#[cfg(test)]` only) so downstream
// crates — mlm-api's integration tests in particular — can build the same
// LifecycleEngine scenarios from spec.md §8 without duplicating fakes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mlm_contracts::ModelSpec;

use crate::container_driver::{ContainerDriver, ContainerInspection};
use crate::health_prober::{HealthProber, ProbeOutcome};

/// Always succeeds; records calls for assertions.
pub struct FakeContainerDriver {
    pub start_calls: Arc<AtomicU32>,
    pub stop_calls: Arc<AtomicU32>,
    pub fail_start: bool,
    pub fail_stop: bool,
}

impl Default for FakeContainerDriver {
    fn default() -> Self {
        Self {
            start_calls: Arc::new(AtomicU32::new(0)),
            stop_calls: Arc::new(AtomicU32::new(0)),
            fail_start: false,
            fail_stop: false,
        }
    }
}

impl FakeContainerDriver {
    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn failing_stop() -> Self {
        Self {
            fail_stop: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ContainerDriver for FakeContainerDriver {
    async fn inspect(&self, _container_name: &str) -> anyhow::Result<ContainerInspection> {
        Ok(ContainerInspection::absent())
    }

    async fn start(&self, _spec: &ModelSpec) -> anyhow::Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            anyhow::bail!("fake driver start failure");
        }
        Ok(())
    }

    async fn stop(&self, _spec: &ModelSpec) -> anyhow::Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            anyhow::bail!("fake driver stop failure");
        }
        Ok(())
    }
}

/// Scripted health prober driven by a shared attempt counter.
pub struct FakeHealthProber {
    attempts: AtomicU32,
    fail_until: u32,
    always_fail: bool,
}

impl FakeHealthProber {
    pub fn always_ok() -> Self {
        Self {
            attempts: AtomicU32::new(0),
            fail_until: 0,
            always_fail: false,
        }
    }

    pub fn never_ok() -> Self {
        Self {
            attempts: AtomicU32::new(0),
            fail_until: u32::MAX,
            always_fail: true,
        }
    }

    /// Returns `transport_error` for the first `n` probes, then `ok`.
    pub fn failing_then_ok(n: u32) -> Self {
        Self {
            attempts: AtomicU32::new(0),
            fail_until: n,
            always_fail: false,
        }
    }
}

#[async_trait]
impl HealthProber for FakeHealthProber {
    async fn probe(&self, _host: &str, _port: u16) -> ProbeOutcome {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.always_fail || attempt <= self.fail_until {
            ProbeOutcome::TransportError
        } else {
            ProbeOutcome::Ok
        }
    }
}
