//! Deterministic in-process simulator driven by an instruction script.
//!
//! `ScriptedSimulator` implements [`PatchSimulator`] without any real processor
//! model: each script entry is consumed by the patch-information unit on its own
//! cycle and applies its patch updates immediately. Pipeline signals report busy
//! until the script is exhausted and the settle cycle is reached, then idle.

use std::collections::HashSet;

use crate::escape;
use crate::value::{HostValue, NumericScalar};

use super::{
    GridShape, InstructionKind, IntakeSignals, OpcodeTable, PatchField, PatchSimulator, SimulatorFault,
    SimulatorProfile, StateError, TailUnit,
};

/// Opcode bit patterns used by the scripted instruction set.
#[must_use]
pub fn standard_opcodes() -> OpcodeTable {
    OpcodeTable::new([
        ("00000", InstructionKind::Lqi),
        ("00001", InstructionKind::PrepInfo),
        ("00010", InstructionKind::MergeInfo),
        ("00011", InstructionKind::SplitInfo),
        ("00100", InstructionKind::RunEsm),
        ("00101", InstructionKind::InitIntmd),
        ("00110", InstructionKind::MeasIntmd),
        ("00111", InstructionKind::PpmInterpret),
        ("01000", InstructionKind::LqmX),
        ("01001", InstructionKind::LqmY),
        ("01010", InstructionKind::LqmZ),
        ("01011", InstructionKind::LqmFb),
    ])
}

/// State of one scripted patch.
#[derive(Debug, Clone)]
pub struct ScriptedPatch {
    pub kind: HostValue,
    pub merged_reg: HostValue,
    pub merged_mem: HostValue,
    pub face: HostValue,
    pub corner: HostValue,
}

impl ScriptedPatch {
    /// An unallocated patch.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            kind: HostValue::variant("placeholder"),
            merged_reg: HostValue::Scalar(NumericScalar::I64(0)),
            merged_mem: HostValue::Scalar(NumericScalar::I64(0)),
            face: labels(["i", "i", "i", "i"]),
            corner: labels(["i", "i", "i", "i"]),
        }
    }

    /// A patch holding a logical qubit.
    #[must_use]
    pub fn active() -> Self {
        Self {
            kind: HostValue::variant("active"),
            merged_reg: HostValue::Scalar(NumericScalar::I64(0)),
            merged_mem: HostValue::Scalar(NumericScalar::I64(0)),
            face: labels(["x", "z", "x", "z"]),
            corner: labels(["xz", "zx", "zx", "xz"]),
        }
    }

    /// Marks the patch as merged in register and memory.
    #[must_use]
    pub fn merged(mut self) -> Self {
        self.merged_reg = HostValue::Scalar(NumericScalar::I64(1));
        self.merged_mem = HostValue::Scalar(NumericScalar::I64(1));
        self
    }

    /// Replaces the face boundary labels, `(w, n, e, s)`.
    #[must_use]
    pub fn with_face(mut self, face: [&str; 4]) -> Self {
        self.face = labels(face);
        self
    }
}

fn labels(slots: [&str; 4]) -> HostValue {
    HostValue::Seq(slots.iter().map(|s| HostValue::from(*s)).collect())
}

/// One script entry: an opcode and the patch updates it performs when accepted.
#[derive(Debug, Clone)]
pub struct ScriptedInstruction {
    pub opcode: String,
    pub updates: Vec<(usize, ScriptedPatch)>,
}

impl ScriptedInstruction {
    /// Creates an instruction of the given kind using [`standard_opcodes`].
    #[must_use]
    pub fn of(kind: InstructionKind) -> Self {
        let opcode = standard_opcodes().opcode_of(kind).unwrap_or_default().to_string();
        Self {
            opcode,
            updates: Vec::new(),
        }
    }

    /// Adds a patch update.
    #[must_use]
    pub fn set_patch(mut self, index: usize, patch: ScriptedPatch) -> Self {
        self.updates.push((index, patch));
        self
    }
}

#[derive(Debug, Clone)]
struct ScriptedExit {
    cycle: u64,
    code: i32,
    message: Option<String>,
}

/// Builder for [`ScriptedSimulator`].
#[derive(Debug, Clone)]
pub struct ScriptedSimulatorBuilder {
    grid: GridShape,
    program: Vec<ScriptedInstruction>,
    settle_after: u64,
    natural_completion: bool,
    stall_until: u64,
    exit: Option<ScriptedExit>,
    fault_at: Option<u64>,
    hidden: HashSet<(String, String)>,
    hidden_fields: HashSet<PatchField>,
}

impl ScriptedSimulatorBuilder {
    /// Appends an instruction to the script.
    #[must_use]
    pub fn instruction(mut self, instruction: ScriptedInstruction) -> Self {
        self.program.push(instruction);
        self
    }

    /// Cycle from which the pipeline reports idle once the script is exhausted.
    #[must_use]
    pub const fn settle_after(mut self, cycle: u64) -> Self {
        self.settle_after = cycle;
        self
    }

    /// Whether the measurement unit raises its own done flag once settled.
    #[must_use]
    pub const fn natural_completion(mut self, enabled: bool) -> Self {
        self.natural_completion = enabled;
        self
    }

    /// The patch-information unit stalls its intake before this cycle.
    #[must_use]
    pub const fn stall_until(mut self, cycle: u64) -> Self {
        self.stall_until = cycle;
        self
    }

    /// Calls the process exit primitive during the transfer phase of `cycle`.
    #[must_use]
    pub fn exit_at(mut self, cycle: u64, code: i32, message: Option<&str>) -> Self {
        self.exit = Some(ScriptedExit {
            cycle,
            code,
            message: message.map(str::to_string),
        });
        self
    }

    /// Fails the transfer phase of `cycle`.
    #[must_use]
    pub const fn fault_at(mut self, cycle: u64) -> Self {
        self.fault_at = Some(cycle);
        self
    }

    /// Makes `unit.signal` unreadable.
    #[must_use]
    pub fn hide(mut self, unit: &str, signal: &str) -> Self {
        self.hidden.insert((unit.to_string(), signal.to_string()));
        self
    }

    /// Makes a patch field unreadable for every patch.
    #[must_use]
    pub fn hide_field(mut self, field: PatchField) -> Self {
        self.hidden_fields.insert(field);
        self
    }

    /// Builds the simulator.
    #[must_use]
    pub fn build(self) -> ScriptedSimulator {
        ScriptedSimulator {
            patches: vec![ScriptedPatch::placeholder(); self.grid.num_patches()],
            grid: self.grid,
            opcodes: standard_opcodes(),
            program: self.program,
            pc: 0,
            cycle: 0,
            intake: IntakeSignals::default(),
            fetch_done: false,
            measure_done: false,
            settle_after: self.settle_after,
            natural_completion: self.natural_completion,
            stall_until: self.stall_until,
            exit: self.exit,
            fault_at: self.fault_at,
            hidden: self.hidden,
            hidden_fields: self.hidden_fields,
        }
    }
}

/// A scripted patch processor.
#[derive(Debug, Clone)]
pub struct ScriptedSimulator {
    grid: GridShape,
    opcodes: OpcodeTable,
    patches: Vec<ScriptedPatch>,
    program: Vec<ScriptedInstruction>,
    pc: usize,
    cycle: u64,
    intake: IntakeSignals,
    fetch_done: bool,
    measure_done: bool,
    settle_after: u64,
    natural_completion: bool,
    stall_until: u64,
    exit: Option<ScriptedExit>,
    fault_at: Option<u64>,
    hidden: HashSet<(String, String)>,
    hidden_fields: HashSet<PatchField>,
}

impl ScriptedSimulator {
    /// Starts a builder for a `rows x cols` grid. Defaults: empty script,
    /// settles immediately, completes on its own.
    #[must_use]
    pub fn builder(rows: usize, cols: usize) -> ScriptedSimulatorBuilder {
        ScriptedSimulatorBuilder {
            grid: GridShape::new(rows, cols),
            program: Vec::new(),
            settle_after: 0,
            natural_completion: true,
            stall_until: 0,
            exit: None,
            fault_at: None,
            hidden: HashSet::new(),
            hidden_fields: HashSet::new(),
        }
    }

    /// Replaces one patch directly, outside the script.
    pub fn set_patch(&mut self, index: usize, patch: ScriptedPatch) {
        if let Some(slot) = self.patches.get_mut(index) {
            *slot = patch;
        }
    }

    fn all_fetched(&self) -> bool {
        self.pc >= self.program.len()
    }

    fn settled(&self) -> bool {
        self.all_fetched() && self.cycle >= self.settle_after
    }

    fn pipeline_state(&self) -> HostValue {
        HostValue::from(if self.settled() { "ready" } else { "busy" })
    }
}

impl PatchSimulator for ScriptedSimulator {
    fn grid(&self) -> GridShape {
        self.grid
    }

    fn profile(&self) -> SimulatorProfile {
        SimulatorProfile {
            block_type: "scripted".to_string(),
            code_distance: 5,
        }
    }

    fn cycle(&self) -> u64 {
        self.cycle
    }

    fn transfer(&mut self) -> Result<(), SimulatorFault> {
        if let Some(exit) = &self.exit {
            if self.cycle >= exit.cycle {
                escape::terminate_with(exit.code, exit.message.clone());
            }
        }
        if self.fault_at == Some(self.cycle) {
            return Err(SimulatorFault::new("piu", "scripted fault"));
        }

        self.intake = IntakeSignals::default();
        let Some(instruction) = self.program.get(self.pc) else {
            return Ok(());
        };

        if self.cycle < self.stall_until {
            self.intake = IntakeSignals {
                take_input: true,
                input_stall: true,
                opcode: Some(instruction.opcode.clone()),
            };
            return Ok(());
        }

        let instruction = instruction.clone();
        for (index, patch) in instruction.updates {
            self.set_patch(index, patch);
        }
        self.intake = IntakeSignals {
            take_input: true,
            input_stall: false,
            opcode: Some(instruction.opcode),
        };
        self.pc += 1;
        Ok(())
    }

    fn update(&mut self) -> Result<(), SimulatorFault> {
        Ok(())
    }

    fn tick(&mut self) -> Result<(), SimulatorFault> {
        self.cycle += 1;
        if self.all_fetched() {
            self.fetch_done = true;
        }
        if self.natural_completion && self.settled() {
            self.measure_done = true;
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.fetch_done && self.measure_done
    }

    fn unit_done(&self, unit: TailUnit) -> bool {
        match unit {
            TailUnit::InstructionFetch => self.fetch_done,
            TailUnit::LogicalMeasurement => self.measure_done,
        }
    }

    fn force_unit_done(&mut self, unit: TailUnit) {
        match unit {
            TailUnit::InstructionFetch => self.fetch_done = true,
            TailUnit::LogicalMeasurement => self.measure_done = true,
        }
    }

    fn intake(&self) -> IntakeSignals {
        self.intake.clone()
    }

    fn opcode_table(&self) -> &OpcodeTable {
        &self.opcodes
    }

    fn patch_field(&self, index: usize, field: PatchField) -> Result<HostValue, StateError> {
        if self.hidden_fields.contains(&field) {
            return Err(StateError::Unavailable {
                unit: "piu".to_string(),
                signal: format!("{field:?}"),
                reason: "hidden by script".to_string(),
            });
        }
        let patch = self
            .patches
            .get(index)
            .ok_or(StateError::PatchOutOfRange { index })?;
        Ok(match field {
            PatchField::Kind => patch.kind.clone(),
            PatchField::MergedRegister => patch.merged_reg.clone(),
            PatchField::MergedMemory => patch.merged_mem.clone(),
            PatchField::FaceBoundary => patch.face.clone(),
            PatchField::CornerBoundary => patch.corner.clone(),
        })
    }

    fn read_state(&self, unit: &str, signal: &str) -> Result<HostValue, StateError> {
        if self.hidden.contains(&(unit.to_string(), signal.to_string())) {
            return Err(StateError::Unavailable {
                unit: unit.to_string(),
                signal: signal.to_string(),
                reason: "hidden by script".to_string(),
            });
        }

        let settled = self.settled();
        let value = match (unit, signal) {
            ("qif", "all_fetched") => HostValue::Bool(self.all_fetched()),
            ("qif", "output_instbuf_empty") => HostValue::Bool(settled),
            ("qif", "done") => HostValue::Bool(self.fetch_done),
            ("qid", "all_decoded")
            | ("qid", "to_pchdec_buf.empty")
            | ("qid", "to_lqmeas_buf.empty") => HostValue::Scalar(NumericScalar::Bool(settled)),
            ("pdu" | "piu" | "psu" | "lmu", "state") => self.pipeline_state(),
            ("piu", "input_stall") => HostValue::Bool(self.intake.input_stall),
            ("piu", "take_input") => HostValue::Bool(self.intake.take_input),
            ("lmu", "input_lqmeasbuf_empty") => HostValue::Bool(settled),
            ("lmu", "instinfo_valid") => HostValue::Bool(!settled),
            ("lmu", "done") => HostValue::Bool(self.measure_done),
            _ => {
                return Err(StateError::Unknown {
                    unit: unit.to_string(),
                    signal: signal.to_string(),
                })
            }
        };
        Ok(value)
    }
}
