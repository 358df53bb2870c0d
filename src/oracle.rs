//! Stability oracle: infers pipeline quiescence from named unit signals.
//!
//! The wrapped simulator's own done flag is not reliable for every instruction
//! stream shape. The oracle reads a fixed table of conditions across the fetch,
//! decode, patch and measurement units. A condition that cannot be read makes the
//! verdict undetermined, which is never treated as stable.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

use crate::metadata::TraceMetadata;
use crate::observe::{observe, observe_equals, observe_flag, Observation};
use crate::sim::{PatchSimulator, TailUnit};
use crate::value::truthy;

/// Expected value of a condition's signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Truthy,
    Falsy,
    Equals(&'static str),
}

/// A named signal expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityCondition {
    pub name: &'static str,
    pub unit: &'static str,
    pub signal: &'static str,
    pub expect: Expect,
}

impl StabilityCondition {
    const fn new(name: &'static str, unit: &'static str, signal: &'static str, expect: Expect) -> Self {
        Self {
            name,
            unit,
            signal,
            expect,
        }
    }

    /// Reads the condition from the simulator.
    pub fn read<S: PatchSimulator + ?Sized>(&self, sim: &S) -> Observation<bool> {
        observe(sim, self.unit, self.signal).map(|value| match self.expect {
            Expect::Truthy => truthy(&value),
            Expect::Falsy => !truthy(&value),
            Expect::Equals(expected) => value.as_str() == Some(expected),
        })
    }
}

/// Conditions that together mean no further patch change can happen.
pub const DEFAULT_CONDITIONS: &[StabilityCondition] = &[
    StabilityCondition::new("fetch_exhausted", "qif", "all_fetched", Expect::Truthy),
    StabilityCondition::new("fetch_buffer_empty", "qif", "output_instbuf_empty", Expect::Truthy),
    StabilityCondition::new("decode_exhausted", "qid", "all_decoded", Expect::Truthy),
    StabilityCondition::new("decode_patch_buffer_empty", "qid", "to_pchdec_buf.empty", Expect::Truthy),
    StabilityCondition::new("decode_measure_buffer_empty", "qid", "to_lqmeas_buf.empty", Expect::Truthy),
    StabilityCondition::new("patch_decoder_idle", "pdu", "state", Expect::Equals("ready")),
    StabilityCondition::new("patch_info_idle", "piu", "state", Expect::Equals("ready")),
    StabilityCondition::new("patch_info_unstalled", "piu", "input_stall", Expect::Falsy),
    StabilityCondition::new("patch_schedule_idle", "psu", "state", Expect::Equals("ready")),
    StabilityCondition::new("measurement_idle", "lmu", "state", Expect::Equals("ready")),
    StabilityCondition::new("measurement_input_empty", "lmu", "input_lqmeasbuf_empty", Expect::Truthy),
    StabilityCondition::new("measurement_no_pending", "lmu", "instinfo_valid", Expect::Falsy),
];

/// One condition's reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionReading {
    pub name: String,
    pub value: bool,
    pub observed: bool,
}

/// Tri-state oracle verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityVerdict {
    /// Every condition was read and holds.
    Stable,
    /// Every condition was read; these do not hold.
    NotStable { failing: Vec<String> },
    /// These conditions could not be read.
    Undetermined { unobservable: Vec<String> },
}

/// All readings from one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilityReport {
    pub readings: Vec<ConditionReading>,
}

impl StabilityReport {
    /// Reduces readings to a verdict.
    #[must_use]
    pub fn verdict(&self) -> StabilityVerdict {
        let unobservable: Vec<String> = self
            .readings
            .iter()
            .filter(|r| !r.observed)
            .map(|r| r.name.clone())
            .collect();
        if !unobservable.is_empty() {
            return StabilityVerdict::Undetermined { unobservable };
        }

        let failing: Vec<String> = self
            .readings
            .iter()
            .filter(|r| !r.value)
            .map(|r| r.name.clone())
            .collect();
        if failing.is_empty() {
            StabilityVerdict::Stable
        } else {
            StabilityVerdict::NotStable { failing }
        }
    }

    /// Readings as a JSON object `{ name: value | null }`; unreadable is null.
    #[must_use]
    pub fn to_json(&self) -> Json {
        let mut map = Map::with_capacity(self.readings.len());
        for r in &self.readings {
            let value = if r.observed { Json::Bool(r.value) } else { Json::Null };
            map.insert(r.name.clone(), value);
        }
        Json::Object(map)
    }
}

/// Evaluates a table of stability conditions.
#[derive(Debug, Clone)]
pub struct StabilityOracle {
    conditions: &'static [StabilityCondition],
}

impl Default for StabilityOracle {
    fn default() -> Self {
        Self::new(DEFAULT_CONDITIONS)
    }
}

impl StabilityOracle {
    /// Creates an oracle over a custom condition table.
    #[must_use]
    pub const fn new(conditions: &'static [StabilityCondition]) -> Self {
        Self { conditions }
    }

    /// The condition table.
    #[must_use]
    pub const fn conditions(&self) -> &'static [StabilityCondition] {
        self.conditions
    }

    /// Reads every condition.
    pub fn evaluate<S: PatchSimulator + ?Sized>(&self, sim: &S) -> StabilityReport {
        let readings = self
            .conditions
            .iter()
            .map(|c| {
                let obs = c.read(sim);
                ConditionReading {
                    name: c.name.to_string(),
                    value: obs.value,
                    observed: obs.observed,
                }
            })
            .collect();
        StabilityReport { readings }
    }

    /// True only if every condition was read and holds. Unreadable conditions
    /// are recorded in `metadata`.
    pub fn is_stable<S: PatchSimulator + ?Sized>(&self, sim: &S, cycle: u64, metadata: &mut TraceMetadata) -> bool {
        match self.evaluate(sim).verdict() {
            StabilityVerdict::Stable => true,
            StabilityVerdict::NotStable { .. } => false,
            StabilityVerdict::Undetermined { unobservable } => {
                tracing::debug!(cycle, ?unobservable, "stability undetermined");
                metadata.record_stability_failure(cycle, unobservable);
                false
            }
        }
    }
}

/// A tail unit's local completion reading.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCompletion {
    pub plausible: bool,
    pub signals: Json,
}

/// Reads a tail unit's own hint that it has nothing left to do.
///
/// Fetch: every instruction fetched while the output buffer still drains.
/// Measurement: idle and either no pending instruction info or an empty input
/// buffer. An unreadable signal never counts as satisfied.
pub fn local_completion<S: PatchSimulator + ?Sized>(sim: &S, unit: TailUnit) -> LocalCompletion {
    let name = unit.unit_name();
    match unit {
        TailUnit::InstructionFetch => {
            let fetched = observe_flag(sim, name, "all_fetched");
            let drained = observe_flag(sim, name, "output_instbuf_empty");
            LocalCompletion {
                plausible: fetched.holds() && drained.observed && !drained.value,
                signals: json!({
                    "all_fetched": flag_json(&fetched),
                    "output_instbuf_empty": flag_json(&drained),
                }),
            }
        }
        TailUnit::LogicalMeasurement => {
            let ready = observe_equals(sim, name, "state", "ready");
            let pending = observe_flag(sim, name, "instinfo_valid");
            let input_empty = observe_flag(sim, name, "input_lqmeasbuf_empty");
            let idle_input = (pending.observed && !pending.value) || input_empty.holds();
            LocalCompletion {
                plausible: ready.holds() && idle_input,
                signals: json!({
                    "state_ready": flag_json(&ready),
                    "instinfo_valid": flag_json(&pending),
                    "input_lqmeasbuf_empty": flag_json(&input_empty),
                }),
            }
        }
    }
}

fn flag_json(obs: &Observation<bool>) -> Json {
    if obs.observed {
        Json::Bool(obs.value)
    } else {
        Json::Null
    }
}
