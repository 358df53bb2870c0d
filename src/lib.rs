//! # patchtrace - Patch Shape Tracing for Surface-Code Processors
//!
//! patchtrace drives a cycle-stepped surface-code patch processor simulator and
//! records how the patch layout changes as the instruction stream executes. The
//! result is a replayable timeline: the initial patch grid plus one event per
//! instruction that changed it.
//!
//! ## Core Concepts
//!
//! - **PatchSimulator**: Narrow adapter trait over the wrapped simulator
//! - **PatchSnapshot**: Full read of every patch at one instant; diffable
//! - **PatchEvent**: A boundary preparation, merge or split that changed patches
//! - **StabilityOracle**: Infers pipeline quiescence when the done flag lags
//! - **TraceGate**: At most one trace per process; others fail fast
//!
//! ## Usage
//!
//! ```rust,ignore
//! use patchtrace::{TraceConfig, TraceRequest, TraceService};
//!
//! let service = TraceService::new(compiler, simulator_factory, TraceConfig::from_env()?)?;
//! let report = service.trace(&TraceRequest::new(qasm))?;
//! println!("{}", report.to_json_string()?);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Value model and simulator seam
pub mod error;
pub mod observe;
pub mod sim;
pub mod value;

// Tracing core
pub mod metadata;
pub mod oracle;
pub mod recorder;
pub mod snapshot;

// Execution
pub mod driver;
pub mod escape;
pub mod gate;

// Orchestration
pub mod compiler;
pub mod config;
pub mod report;
pub mod service;

// Re-export primary types at crate root for convenience
pub use compiler::{
    ArtifactGuard, CircuitCompiler, CircuitSummary, CompileError, CompilePlan, CompileRequest, CompiledProgram,
    LogicalQubit, QubitRole,
};
pub use config::{CircuitLimits, SimulatorOptions, TraceConfig};
pub use driver::{DriverLimits, DriverOutcome, TailForcing, TerminationReason, TraceDriver};
pub use error::{ExecutionError, TraceError, TraceResult, ValidationError};
pub use gate::{GateStatus, TraceGate, TracePermit};
pub use metadata::{ForceReason, ForcedTermination, StabilityCheckFailure, TraceMetadata};
pub use observe::Observation;
pub use oracle::{StabilityOracle, StabilityVerdict};
pub use recorder::{EventRecorder, PatchEvent};
pub use report::TraceReport;
pub use service::{HealthStatus, TraceRequest, TraceService};
pub use sim::{
    GridShape, InstructionKind, IntakeSignals, OpcodeTable, PatchField, PatchSimulator, SimulatorFactory,
    SimulatorFault, SimulatorProfile, SimulatorSetup, StateError, TailUnit,
};
pub use snapshot::{PatchDelta, PatchRecord, PatchSnapshot};
pub use value::{normalize, HostValue};
