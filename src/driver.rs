//! Cycle-stepping execution driver.
//!
//! The driver advances the simulator one cycle at a time until its done flag
//! rises, feeding the event recorder after every transfer phase. It also bounds
//! the run: wall-clock and cycle ceilings end a trace early with a partial
//! result, and tail units the stability oracle shows to be finished are forced
//! to done when the simulator would not raise the flag itself.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use tracing::{debug, info, warn};

use crate::error::{ExecutionError, TraceResult, ValidationError};
use crate::escape::{self, Contained};
use crate::gate::TracePermit;
use crate::metadata::{ForceReason, ForcedTermination, TraceMetadata};
use crate::oracle::{local_completion, StabilityOracle};
use crate::recorder::{EventRecorder, PatchEvent};
use crate::sim::{GridShape, PatchSimulator, SimulatorFault, SimulatorProfile, TailUnit};
use crate::snapshot::PatchSnapshot;

/// When a locally complete tail unit may be forced to done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailForcing {
    /// Only when the stability oracle also reports the pipeline stable.
    #[default]
    Corroborated,
    /// On the unit's own completion signal alone.
    LocalOnly,
}

/// Bounds on one trace run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverLimits {
    /// Wall-clock ceiling in milliseconds.
    pub max_wall_time_ms: u64,
    /// Cycle ceiling; exceeding it ends the run.
    pub max_cycles: u64,
    /// Loop iterations between wall-clock checks and diagnostics.
    pub check_interval: u64,
    /// Emit periodic diagnostics.
    pub verbose: bool,
    /// When a tail unit may be forced done.
    pub tail_forcing: TailForcing,
}

impl Default for DriverLimits {
    fn default() -> Self {
        Self {
            max_wall_time_ms: 300_000,
            max_cycles: 10_000_000,
            check_interval: 1000,
            verbose: false,
            tail_forcing: TailForcing::Corroborated,
        }
    }
}

impl DriverLimits {
    /// Rejects limits that would stop every run immediately or never check time.
    ///
    /// # Errors
    /// `ValidationError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: &str| {
            Err(ValidationError::InvalidConfig {
                reason: reason.to_string(),
            })
        };
        if self.max_wall_time_ms == 0 {
            return invalid("max_wall_time_ms must be positive");
        }
        if self.max_cycles == 0 {
            return invalid("max_cycles must be positive");
        }
        if self.check_interval == 0 {
            return invalid("check_interval must be positive");
        }
        Ok(())
    }
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The simulator raised its done flag without help.
    Normal,
    /// A tail unit was forced after the system was judged stable.
    SystemStable,
    /// A tail unit was forced on its own completion signal.
    LocalCompletion,
    /// Wall-clock ceiling reached; the result is partial.
    Timeout,
    /// Cycle ceiling exceeded; the result is partial.
    MaxCycles,
}

impl From<ForceReason> for TerminationReason {
    fn from(reason: ForceReason) -> Self {
        match reason {
            ForceReason::SystemStable => Self::SystemStable,
            ForceReason::LocalCompletion => Self::LocalCompletion,
            ForceReason::Timeout => Self::Timeout,
        }
    }
}

impl TerminationReason {
    /// True when the run ended before the simulator completed.
    #[must_use]
    pub const fn is_partial(self) -> bool {
        matches!(self, Self::Timeout | Self::MaxCycles)
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct DriverOutcome {
    /// Patch state before the first cycle.
    pub initial: PatchSnapshot,
    /// Recorded patch events in order.
    pub events: Vec<PatchEvent>,
    /// Forcings, oracle failures and warnings.
    pub metadata: TraceMetadata,
    /// How the run ended.
    pub termination: TerminationReason,
    /// Cycles ticked.
    pub total_cycles: u64,
    /// Instructions taken by the patch-information unit.
    pub accepted_instructions: u64,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
    /// Simulator profile read at start.
    pub profile: SimulatorProfile,
    /// Patch grid dimensions.
    pub grid: GridShape,
}

/// Drives one simulator instance to completion.
///
/// Borrowing a [`TracePermit`] ties the run to the trace gate and its escape
/// interceptor.
pub struct TraceDriver<'p, S: PatchSimulator> {
    sim: S,
    limits: DriverLimits,
    oracle: StabilityOracle,
    _permit: &'p TracePermit,
}

impl<'p, S: PatchSimulator> TraceDriver<'p, S> {
    /// Creates a driver over a freshly set-up simulator.
    pub fn new(sim: S, limits: DriverLimits, permit: &'p TracePermit) -> Self {
        Self {
            sim,
            limits,
            oracle: StabilityOracle::default(),
            _permit: permit,
        }
    }

    /// Replaces the stability oracle.
    #[must_use]
    pub fn with_oracle(mut self, oracle: StabilityOracle) -> Self {
        self.oracle = oracle;
        self
    }

    /// Runs the simulator until done, forced done, or a limit is reached.
    ///
    /// # Errors
    /// - `ValidationError::InvalidConfig` if the limits are invalid
    /// - `ExecutionError::SimulatorExit` if simulator code requested a process exit
    /// - `ExecutionError::SimulatorFault` if a simulator phase failed
    /// - `ExecutionError::Unexpected` for any other panic inside the loop
    pub fn run(mut self) -> TraceResult<DriverOutcome> {
        self.limits.validate()?;
        let started = Instant::now();
        let grid = self.sim.grid();
        let profile = self.sim.profile();
        let initial = PatchSnapshot::capture(&self.sim);
        let mut recorder = EventRecorder::new(initial.clone());
        let mut metadata = TraceMetadata::new();

        info!(
            rows = grid.rows,
            cols = grid.cols,
            block_type = %profile.block_type,
            max_cycles = self.limits.max_cycles,
            "trace driver started"
        );

        let stepped = escape::contain(|| self.step(&mut recorder, &mut metadata, started));
        let cycle = self.sim.cycle();
        let termination = match stepped {
            Ok(Ok(termination)) => termination,
            Ok(Err(fault)) => {
                warn!(unit = %fault.unit, cycle, "simulator fault");
                return Err(ExecutionError::SimulatorFault {
                    unit: fault.unit,
                    cycle,
                    message: fault.message,
                }
                .into());
            }
            Err(Contained::Exit(request)) => {
                warn!(code = request.code, cycle, "simulator requested process exit");
                return Err(ExecutionError::SimulatorExit {
                    code: request.code,
                    cycle,
                    diagnosis: escape::describe_exit(&request),
                }
                .into());
            }
            Err(Contained::Panic(message)) => {
                warn!(cycle, %message, "trace loop panicked");
                return Err(ExecutionError::Unexpected { cycle, message }.into());
            }
        };

        let elapsed = started.elapsed();
        info!(
            cycles = cycle,
            events = recorder.events().len(),
            termination = ?termination,
            elapsed_ms = elapsed.as_millis() as u64,
            "trace driver finished"
        );

        Ok(DriverOutcome {
            initial,
            accepted_instructions: recorder.accepted(),
            events: recorder.into_events(),
            metadata,
            termination,
            total_cycles: cycle,
            elapsed,
            profile,
            grid,
        })
    }

    fn step(
        &mut self,
        recorder: &mut EventRecorder,
        metadata: &mut TraceMetadata,
        started: Instant,
    ) -> Result<TerminationReason, SimulatorFault> {
        let mut termination = TerminationReason::Normal;
        let mut iteration: u64 = 0;

        while !self.sim.is_done() {
            if iteration % self.limits.check_interval == 0 {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                if elapsed_ms >= self.limits.max_wall_time_ms {
                    self.time_out(metadata, elapsed_ms);
                    return Ok(TerminationReason::Timeout);
                }
                if self.limits.verbose {
                    self.log_diagnostics(iteration);
                }
            }
            iteration += 1;

            self.sim.transfer()?;
            recorder.observe(&self.sim);
            self.sim.update()?;
            self.sim.tick()?;

            if !self.sim.is_done() {
                if let Some(reason) = self.force_tail(metadata) {
                    termination = reason.into();
                }
            }

            let cycle = self.sim.cycle();
            if cycle > self.limits.max_cycles {
                warn!(cycle, max_cycles = self.limits.max_cycles, "cycle ceiling exceeded");
                metadata.warn(format!(
                    "simulation exceeded {} cycles; trace is partial",
                    self.limits.max_cycles
                ));
                return Ok(TerminationReason::MaxCycles);
            }
        }

        Ok(termination)
    }

    /// Forces locally complete tail units per the configured policy.
    fn force_tail(&mut self, metadata: &mut TraceMetadata) -> Option<ForceReason> {
        let candidates: Vec<_> = TailUnit::ALL
            .into_iter()
            .filter(|unit| !self.sim.unit_done(*unit))
            .map(|unit| (unit, local_completion(&self.sim, unit)))
            .filter(|(_, local)| local.plausible)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let cycle = self.sim.cycle();
        let reason = match self.limits.tail_forcing {
            TailForcing::Corroborated => {
                if !self.oracle.is_stable(&self.sim, cycle, metadata) {
                    return None;
                }
                ForceReason::SystemStable
            }
            TailForcing::LocalOnly => ForceReason::LocalCompletion,
        };

        let readings = self.oracle.evaluate(&self.sim).to_json();
        for (unit, local) in candidates {
            info!(unit = %unit, cycle, reason = ?reason, "forcing tail unit to done");
            self.sim.force_unit_done(unit);
            metadata.record_forced(ForcedTermination {
                unit: unit.unit_name().to_string(),
                cycle,
                reason,
                observed: json!({
                    "stability": readings.clone(),
                    "local": local.signals,
                }),
            });
        }
        Some(reason)
    }

    fn time_out(&self, metadata: &mut TraceMetadata, elapsed_ms: u64) {
        let cycle = self.sim.cycle();
        warn!(cycle, elapsed_ms, max_wall_time_ms = self.limits.max_wall_time_ms, "trace timed out");
        metadata.record_forced(ForcedTermination {
            unit: "driver".to_string(),
            cycle,
            reason: ForceReason::Timeout,
            observed: json!({
                "elapsed_ms": elapsed_ms,
                "max_wall_time_ms": self.limits.max_wall_time_ms,
            }),
        });
        metadata.warn(format!(
            "trace timed out after {elapsed_ms} ms at cycle {cycle}; trace is partial"
        ));
    }

    fn log_diagnostics(&self, iteration: u64) {
        let readings: Json = self.oracle.evaluate(&self.sim).to_json();
        debug!(
            iteration,
            cycle = self.sim.cycle(),
            qif_done = self.sim.unit_done(TailUnit::InstructionFetch),
            lmu_done = self.sim.unit_done(TailUnit::LogicalMeasurement),
            stability = %readings,
            "driver diagnostics"
        );
    }
}
