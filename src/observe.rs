//! Typed observations of optional simulator state.
//!
//! Every read of simulator internals goes through [`Observation`], which keeps
//! the value and whether it could be read at all. A failed read is never
//! silently turned into a meaningful value.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::sim::PatchSimulator;
use crate::value::{normalize, truthy};

/// A value read from the simulator, paired with whether the read succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation<T> {
    pub value: T,
    pub observed: bool,
}

impl<T> Observation<T> {
    /// A successful read.
    pub const fn observed(value: T) -> Self {
        Self {
            value,
            observed: true,
        }
    }

    /// Maps the value, keeping the observed flag.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Observation<U> {
        Observation {
            value: f(self.value),
            observed: self.observed,
        }
    }
}

impl<T: Default> Observation<T> {
    /// A failed read; the value is the type's placeholder.
    #[must_use]
    pub fn unobservable() -> Self {
        Self {
            value: T::default(),
            observed: false,
        }
    }
}

impl Observation<bool> {
    /// True only when the read succeeded and the value is true.
    #[must_use]
    pub const fn holds(&self) -> bool {
        self.observed && self.value
    }
}

/// Reads `unit.signal` and normalizes it.
pub fn observe<S: PatchSimulator + ?Sized>(sim: &S, unit: &str, signal: &str) -> Observation<Json> {
    match sim.read_state(unit, signal) {
        Ok(value) => Observation::observed(normalize(&value)),
        Err(_) => Observation::unobservable(),
    }
}

/// Reads `unit.signal` as a truth value.
pub fn observe_flag<S: PatchSimulator + ?Sized>(sim: &S, unit: &str, signal: &str) -> Observation<bool> {
    observe(sim, unit, signal).map(|v| truthy(&v))
}

/// Reads `unit.signal` and compares its text form with `expected`.
pub fn observe_equals<S: PatchSimulator + ?Sized>(
    sim: &S,
    unit: &str,
    signal: &str,
    expected: &str,
) -> Observation<bool> {
    observe(sim, unit, signal).map(|v| v.as_str() == Some(expected))
}
