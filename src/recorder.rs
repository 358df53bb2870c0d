//! Patch event recording at instruction acceptance.
//!
//! The recorder watches the patch-information unit's intake. Every accepted
//! instruction advances the instruction position; boundary preparation, merge and
//! split instructions additionally trigger a snapshot diff, and a non-empty delta
//! becomes a [`PatchEvent`].

use serde::{Deserialize, Serialize};

use crate::sim::{InstructionKind, IntakeSignals, PatchSimulator};
use crate::snapshot::{PatchDelta, PatchSnapshot};

/// One observed change of patch shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchEvent {
    /// 0-based, in emission order.
    pub sequence_number: u64,
    /// Simulator cycle at acceptance.
    pub cycle: u64,
    /// 0-based position of the instruction among accepted instructions.
    pub instruction_position: u64,
    pub instruction_kind: InstructionKind,
    pub patch_delta: PatchDelta,
}

/// Accumulates patch events for one trace.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    previous: PatchSnapshot,
    events: Vec<PatchEvent>,
    accepted: u64,
}

impl EventRecorder {
    /// Starts recording against the initial snapshot.
    #[must_use]
    pub fn new(initial: PatchSnapshot) -> Self {
        Self {
            previous: initial,
            events: Vec::new(),
            accepted: 0,
        }
    }

    /// Reads the simulator's intake after its transfer phase and records an event
    /// if warranted.
    pub fn observe<S: PatchSimulator + ?Sized>(&mut self, sim: &S) -> Option<&PatchEvent> {
        let intake = sim.intake();
        self.record(&intake, sim)
    }

    /// Records from already-read intake signals.
    pub fn record<S: PatchSimulator + ?Sized>(&mut self, intake: &IntakeSignals, sim: &S) -> Option<&PatchEvent> {
        if !intake.accepted() {
            return None;
        }
        let position = self.accepted;
        self.accepted += 1;

        let kind = intake
            .opcode
            .as_deref()
            .and_then(|opcode| sim.opcode_table().classify(opcode))?;
        if !kind.is_significant() {
            return None;
        }

        // Deltas are measured against the latest significant snapshot, even when
        // that snapshot produced no event.
        let current = PatchSnapshot::capture(sim);
        let delta = self.previous.diff(&current);
        self.previous = current;
        if delta.is_empty() {
            return None;
        }

        self.events.push(PatchEvent {
            sequence_number: self.events.len() as u64,
            cycle: sim.cycle(),
            instruction_position: position,
            instruction_kind: kind,
            patch_delta: delta,
        });
        self.events.last()
    }

    /// Number of instructions accepted so far.
    #[must_use]
    pub const fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Events recorded so far.
    #[must_use]
    pub fn events(&self) -> &[PatchEvent] {
        &self.events
    }

    /// Consumes the recorder, returning its events.
    #[must_use]
    pub fn into_events(self) -> Vec<PatchEvent> {
        self.events
    }
}
