//! Process-wide serialization of traces.
//!
//! The wrapped simulator and the escape interceptor both mutate process-global
//! state, so at most one trace runs per process. A second caller is rejected
//! immediately rather than queued.
//!
//! # Safety
//! - The lock is released when the [`TracePermit`] is dropped, on every path
//! - The escape interceptor lives exactly as long as the permit

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, TraceResult};
use crate::escape::EscapeInterceptor;

static GATE: Mutex<()> = Mutex::new(());
static STARTED_AT: Mutex<Option<DateTime<Utc>>> = Mutex::new(None);

/// Health view of the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStatus {
    pub in_progress: bool,
    pub started_at: Option<DateTime<Utc>>,
}

/// Exclusive right to run one trace.
///
/// Holds the gate lock and the escape interceptor as one critical section.
#[derive(Debug)]
pub struct TracePermit {
    // Field order is drop order: the hook is restored before the lock is released.
    _interceptor: EscapeInterceptor,
    _guard: MutexGuard<'static, ()>,
    started_at: DateTime<Utc>,
}

impl TracePermit {
    /// When this permit was granted.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl Drop for TracePermit {
    fn drop(&mut self) {
        *STARTED_AT.lock().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!("trace gate released");
    }
}

/// Entry point to the process-wide gate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceGate;

impl TraceGate {
    /// Takes the gate without waiting.
    ///
    /// # Errors
    /// `ExecutionError::TraceInProgress` if another trace holds the gate.
    pub fn try_acquire() -> TraceResult<TracePermit> {
        let guard = match GATE.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                tracing::info!("trace rejected: another trace is in progress");
                return Err(ExecutionError::TraceInProgress.into());
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                tracing::warn!("trace gate was poisoned by a panicking trace; recovering");
                poisoned.into_inner()
            }
        };

        let started_at = Utc::now();
        *STARTED_AT.lock().unwrap_or_else(PoisonError::into_inner) = Some(started_at);
        let interceptor = EscapeInterceptor::install();
        tracing::debug!(%started_at, "trace gate acquired");

        Ok(TracePermit {
            _interceptor: interceptor,
            _guard: guard,
            started_at,
        })
    }

    /// Whether a trace is running, and since when.
    #[must_use]
    pub fn status() -> GateStatus {
        let started_at = *STARTED_AT.lock().unwrap_or_else(PoisonError::into_inner);
        GateStatus {
            in_progress: started_at.is_some(),
            started_at,
        }
    }
}
