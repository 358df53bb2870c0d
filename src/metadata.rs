//! Per-trace metadata: forced terminations, stability check failures, notices.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Stability check failures kept per trace.
pub const MAX_STABILITY_FAILURES: usize = 10;

/// Why the driver overrode the simulator's own completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceReason {
    /// Local completion signal corroborated by the stability oracle.
    SystemStable,
    /// Local completion signal alone.
    LocalCompletion,
    /// Wall-clock limit reached.
    Timeout,
}

/// One driver intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcedTermination {
    pub unit: String,
    pub cycle: u64,
    pub reason: ForceReason,
    /// Normalized signals observed when the decision was made.
    pub observed: Json,
}

/// Conditions the stability oracle could not read at one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityCheckFailure {
    pub cycle: u64,
    pub unobservable: Vec<String>,
}

/// Mutable accumulator owned by one trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceMetadata {
    pub forced_terminations: Vec<ForcedTermination>,
    pub stability_check_failures: Vec<StabilityCheckFailure>,
    pub warnings: Vec<String>,
    pub cleanup_errors: Vec<String>,
}

impl TraceMetadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records unobservable conditions; only the first
    /// [`MAX_STABILITY_FAILURES`] records are kept.
    pub fn record_stability_failure(&mut self, cycle: u64, unobservable: Vec<String>) -> bool {
        if self.stability_check_failures.len() >= MAX_STABILITY_FAILURES {
            return false;
        }
        self.stability_check_failures
            .push(StabilityCheckFailure { cycle, unobservable });
        true
    }

    /// Records a driver intervention.
    pub fn record_forced(&mut self, forced: ForcedTermination) {
        self.forced_terminations.push(forced);
    }

    /// Adds an operator-facing notice.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Returns true if the driver intervened at least once.
    #[must_use]
    pub fn was_forced(&self) -> bool {
        !self.forced_terminations.is_empty()
    }
}
