// MemoryGuard: best-effort host-memory admission policy.
//
// Holds no state of its own — memory in use by already-admitted models is
// observed transitively through the host metric on every call (spec.md
// §4.4, §9: "the exact memory in use by a running model cannot be attributed
// reliably to a container from host metrics alone").

use sysinfo::System;

const DEFAULT_MIN_FREE_GB_ENV: &str = "MLM_DEFAULT_MIN_FREE_GB";
const SAFETY_MARGIN_GB_ENV: &str = "MLM_SAFETY_MARGIN_GB";

const DEFAULT_MIN_FREE_GB: f64 = 8.0;
const DEFAULT_SAFETY_MARGIN_GB: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdmitDecision {
    Ok,
    Reject { available_gb: f64, required_gb: f64 },
}

/// Reads host-available memory and decides whether a start request is safe.
pub struct MemoryGuard {
    default_min_free_gb: f64,
    safety_margin_gb: f64,
}

impl MemoryGuard {
    pub fn new() -> Self {
        Self {
            default_min_free_gb: env_f64(DEFAULT_MIN_FREE_GB_ENV, DEFAULT_MIN_FREE_GB),
            safety_margin_gb: env_f64(SAFETY_MARGIN_GB_ENV, DEFAULT_SAFETY_MARGIN_GB),
        }
    }

    /// Bytes of free+reclaimable memory the host currently reports, in GB.
    pub fn available_gb(&self) -> f64 {
        let mut system = System::new();
        system.refresh_memory();
        system.available_memory() as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    /// Admit a start request. `required_gb` is `None` when the catalog entry
    /// didn't declare `estimated_memory_gb` — treated as "unknown" and held
    /// to the conservative default minimum.
    pub fn admit(&self, required_gb: Option<f64>, force: bool) -> AdmitDecision {
        let available_gb = self.available_gb();
        let required_gb = required_gb.unwrap_or(self.default_min_free_gb);

        if available_gb >= required_gb + self.safety_margin_gb {
            return AdmitDecision::Ok;
        }
        if force {
            return AdmitDecision::Ok;
        }
        AdmitDecision::Reject {
            available_gb,
            required_gb,
        }
    }
}

impl Default for MemoryGuard {
    fn default() -> Self {
        Self::new()
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_when_plenty_available() {
        let guard = MemoryGuard {
            default_min_free_gb: 8.0,
            safety_margin_gb: 2.0,
        };
        // available_gb() reads the real host; we only assert the decision
        // logic here by constructing the comparison directly.
        let decision = if 40.0_f64 >= 20.0 + guard.safety_margin_gb {
            AdmitDecision::Ok
        } else {
            AdmitDecision::Reject {
                available_gb: 40.0,
                required_gb: 20.0,
            }
        };
        assert_eq!(decision, AdmitDecision::Ok);
    }

    #[test]
    fn force_overrides_rejection() {
        let guard = MemoryGuard {
            default_min_free_gb: 8.0,
            safety_margin_gb: 2.0,
        };
        let required = f64::MAX / 2.0;
        assert!(matches!(
            guard.admit(Some(required), false),
            AdmitDecision::Reject { .. }
        ));
        assert_eq!(guard.admit(Some(required), true), AdmitDecision::Ok);
    }

    #[test]
    fn rejects_when_insufficient_and_not_forced() {
        let guard = MemoryGuard {
            default_min_free_gb: 8.0,
            safety_margin_gb: 2.0,
        };
        // Directly exercise admit() math with a required value far above any
        // plausible available_gb() reading so the test is host-independent
        // for the force path, and mirrors the reject math for the non-force path.
        let required = f64::MAX / 2.0;
        let decision = guard.admit(Some(required), false);
        assert!(matches!(decision, AdmitDecision::Reject { .. }));

        let decision = guard.admit(Some(required), true);
        assert_eq!(decision, AdmitDecision::Ok);
    }
}
