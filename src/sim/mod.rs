//! Adapter seam over the wrapped patch processor simulator.
//!
//! The simulator is an external, globally mutating object. The trace engine only
//! talks to it through [`PatchSimulator`]: three ordered per-cycle phases, a done
//! flag, per-unit completion flags the driver may force, the intake signals of the
//! patch-information unit, and loosely typed state reads.

pub mod scripted;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compiler::CompiledProgram;
use crate::value::HostValue;

/// Patch grid dimensions. Fixed for a simulator's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    /// Patch rows.
    pub rows: usize,
    /// Patch columns.
    pub cols: usize,
}

impl GridShape {
    /// Creates a grid shape.
    #[must_use]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Total number of patches.
    #[must_use]
    pub const fn num_patches(&self) -> usize {
        self.rows * self.cols
    }

    /// `(row, col)` of a patch index.
    #[must_use]
    pub const fn position(&self, index: usize) -> (usize, usize) {
        if self.cols == 0 {
            return (0, 0);
        }
        (index / self.cols, index % self.cols)
    }
}

/// Static description of the configured simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorProfile {
    /// Configured block type name.
    pub block_type: String,
    /// Surface code distance.
    pub code_distance: u32,
}

/// Instruction kinds of the patch processor instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstructionKind {
    /// Boundary preparation.
    PrepInfo,
    /// Patch merge.
    MergeInfo,
    /// Patch split.
    SplitInfo,
    /// Logical qubit initialization.
    Lqi,
    /// Error syndrome measurement round.
    RunEsm,
    /// Intermediate qubit initialization.
    InitIntmd,
    /// Intermediate qubit measurement.
    MeasIntmd,
    /// Pauli product measurement interpretation.
    PpmInterpret,
    /// Logical X measurement.
    LqmX,
    /// Logical Y measurement.
    LqmY,
    /// Logical Z measurement.
    LqmZ,
    /// Measurement feedback.
    LqmFb,
}

impl InstructionKind {
    /// Kinds that can change patch topology.
    pub const SIGNIFICANT: [Self; 3] = [Self::PrepInfo, Self::MergeInfo, Self::SplitInfo];

    /// True for boundary preparation, merge and split.
    #[must_use]
    pub const fn is_significant(self) -> bool {
        matches!(self, Self::PrepInfo | Self::MergeInfo | Self::SplitInfo)
    }

    /// Mnemonic as it appears in instruction listings.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::PrepInfo => "PREP_INFO",
            Self::MergeInfo => "MERGE_INFO",
            Self::SplitInfo => "SPLIT_INFO",
            Self::Lqi => "LQI",
            Self::RunEsm => "RUN_ESM",
            Self::InitIntmd => "INIT_INTMD",
            Self::MeasIntmd => "MEAS_INTMD",
            Self::PpmInterpret => "PPM_INTERPRET",
            Self::LqmX => "LQM_X",
            Self::LqmY => "LQM_Y",
            Self::LqmZ => "LQM_Z",
            Self::LqmFb => "LQM_FB",
        }
    }
}

impl fmt::Display for InstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Opcode bit patterns of the configured instruction set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpcodeTable {
    entries: Vec<(String, InstructionKind)>,
}

impl OpcodeTable {
    /// Builds a table from `(opcode, kind)` pairs. Later duplicates are ignored.
    pub fn new<I, O>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (O, InstructionKind)>,
        O: Into<String>,
    {
        let mut entries: Vec<(String, InstructionKind)> = Vec::new();
        for (opcode, kind) in pairs {
            let opcode = opcode.into();
            if !entries.iter().any(|(o, _)| *o == opcode) {
                entries.push((opcode, kind));
            }
        }
        Self { entries }
    }

    /// Maps an opcode to its instruction kind.
    #[must_use]
    pub fn classify(&self, opcode: &str) -> Option<InstructionKind> {
        self.entries
            .iter()
            .find(|(o, _)| o == opcode)
            .map(|(_, kind)| *kind)
    }

    /// Returns the opcode assigned to `kind`.
    #[must_use]
    pub fn opcode_of(&self, kind: InstructionKind) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, k)| *k == kind)
            .map(|(o, _)| o.as_str())
    }

    /// Number of opcodes in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no opcodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Intake signals of the patch-information unit for the current cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeSignals {
    /// The unit wants an instruction this cycle.
    pub take_input: bool,
    /// The unit is stalled and will not consume its input.
    pub input_stall: bool,
    /// Opcode at the unit's input, if readable.
    pub opcode: Option<String>,
}

impl IntakeSignals {
    /// An instruction was consumed this cycle.
    #[must_use]
    pub const fn accepted(&self) -> bool {
        self.take_input && !self.input_stall
    }
}

/// Per-patch fields of the patch-information unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchField {
    /// Patch kind.
    Kind,
    /// Merged flag on the register side.
    MergedRegister,
    /// Merged flag on the memory side.
    MergedMemory,
    /// Four slots in `(w, n, e, s)` order.
    FaceBoundary,
    /// Four slots in `(nw, ne, sw, se)` order.
    CornerBoundary,
}

/// Units whose own completion flag the driver may force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailUnit {
    /// Instruction fetch (`qif`).
    InstructionFetch,
    /// Logical measurement (`lmu`).
    LogicalMeasurement,
}

impl TailUnit {
    /// Both tail units, in forcing order.
    pub const ALL: [Self; 2] = [Self::InstructionFetch, Self::LogicalMeasurement];

    /// Unit name used in state reads.
    #[must_use]
    pub const fn unit_name(self) -> &'static str {
        match self {
            Self::InstructionFetch => "qif",
            Self::LogicalMeasurement => "lmu",
        }
    }
}

impl fmt::Display for TailUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.unit_name())
    }
}

/// A state read that could not be served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The simulator has no such signal.
    #[error("unknown signal {unit}.{signal}")]
    Unknown {
        /// Unit name.
        unit: String,
        /// Signal path within the unit.
        signal: String,
    },

    /// The signal exists but cannot be read right now.
    #[error("signal {unit}.{signal} is not readable: {reason}")]
    Unavailable {
        /// Unit name.
        unit: String,
        /// Signal path within the unit.
        signal: String,
        /// Why the read failed.
        reason: String,
    },

    /// Patch index past the end of the grid.
    #[error("patch index {index} is out of range")]
    PatchOutOfRange {
        /// Requested index.
        index: usize,
    },
}

/// A simulator phase failed without escaping the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{unit}: {message}")]
pub struct SimulatorFault {
    /// Unit or phase that failed.
    pub unit: String,
    /// Failure description.
    pub message: String,
}

impl SimulatorFault {
    /// Creates a fault.
    pub fn new(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            message: message.into(),
        }
    }
}

/// Adapter over one simulator instance.
///
/// Implementations wrap the real simulator object; no implementation may be
/// shared across traces.
pub trait PatchSimulator {
    /// Patch grid dimensions.
    fn grid(&self) -> GridShape;

    /// Block type and code distance.
    fn profile(&self) -> SimulatorProfile;

    /// The simulator's step counter.
    fn cycle(&self) -> u64;

    /// Transfer phase.
    fn transfer(&mut self) -> Result<(), SimulatorFault>;

    /// Update phase.
    fn update(&mut self) -> Result<(), SimulatorFault>;

    /// Tick phase. Advances the cycle counter.
    fn tick(&mut self) -> Result<(), SimulatorFault>;

    /// The simulator's own completion flag.
    fn is_done(&self) -> bool;

    /// Completion flag of one tail unit.
    fn unit_done(&self, unit: TailUnit) -> bool;

    /// Sets a tail unit's completion flag.
    fn force_unit_done(&mut self, unit: TailUnit);

    /// Intake signals of the patch-information unit after the transfer phase.
    fn intake(&self) -> IntakeSignals;

    /// Opcodes of the configured instruction set.
    fn opcode_table(&self) -> &OpcodeTable;

    /// Reads one field of one patch.
    fn patch_field(&self, index: usize, field: PatchField) -> Result<HostValue, StateError>;

    /// Reads a named signal of a unit. `signal` may be a dotted path.
    fn read_state(&self, unit: &str, signal: &str) -> Result<HostValue, StateError>;
}

/// Parameters for constructing a simulator instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorSetup {
    /// Simulator configuration name.
    pub config_name: String,
    /// Compiled binary to load.
    pub binary_name: String,
    /// Logical qubits including the reserved ones.
    pub num_logical_qubits: usize,
    /// Skip the physical layer.
    pub skip_physical: bool,
    /// Shots per run.
    pub num_shots: u32,
}

/// Constructs fresh simulator instances.
pub trait SimulatorFactory {
    /// The adapter type produced.
    type Simulator: PatchSimulator;

    /// Builds and sets up a simulator for a compiled program.
    fn setup(&self, setup: &SimulatorSetup, program: &CompiledProgram) -> Result<Self::Simulator, SimulatorFault>;
}
