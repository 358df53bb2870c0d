//! Circuit compiler seam and compile planning.
//!
//! The compiler is an external collaborator: it parses a circuit description,
//! lowers it to a Clifford+T circuit and the patch processor instruction stream,
//! and may leave files behind that the trace is responsible for removing.

use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Shape of a parsed circuit, used for limit checks before compiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSummary {
    pub num_qubits: usize,
    pub num_clbits: usize,
    pub depth: usize,
    pub num_instructions: usize,
}

/// Input to [`CircuitCompiler::compile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    pub circuit: String,
    pub job_name: String,
    pub num_circuit_qubits: usize,
    /// Qubit count to compile with; qubits past `num_circuit_qubits` are idle padding.
    pub num_compile_qubits: usize,
}

/// Compiler output handed to the simulator and echoed in the report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledProgram {
    /// The Clifford+T form of the input circuit.
    pub clifford_t: String,
    /// Instruction listing, one instruction per line.
    pub instructions: Vec<String>,
    /// Name of the assembled binary the simulator loads.
    pub binary_name: String,
}

/// A compiler failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
}

impl CompileError {
    /// Creates a compile error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The external circuit compiler.
pub trait CircuitCompiler {
    /// Parses a circuit description without compiling it.
    fn inspect(&self, circuit: &str) -> Result<CircuitSummary, CompileError>;

    /// Compiles a circuit into an instruction stream and binary.
    fn compile(&self, request: &CompileRequest) -> Result<CompiledProgram, CompileError>;

    /// Transient files a compile of `job_name` produces.
    fn artifacts(&self, _job_name: &str) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Role of a logical qubit in the simulator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QubitRole {
    /// Carries a qubit of the input circuit.
    Data,
    /// Added to make the compiled qubit count odd.
    Padding,
    /// Reserved by the simulator.
    Ancilla,
}

/// One logical qubit of the simulator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalQubit {
    pub index: usize,
    pub role: QubitRole,
    /// Input circuit qubit, for data qubits.
    pub circuit_qubit: Option<usize>,
}

/// Logical qubits the simulator reserves beyond the compiled circuit.
pub const RESERVED_LOGICAL_QUBITS: usize = 2;

/// Qubit counts and job naming for one trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilePlan {
    pub job_name: String,
    pub num_circuit_qubits: usize,
    pub num_compile_qubits: usize,
    pub num_logical_qubits: usize,
}

impl CompilePlan {
    /// Plans a compile for a circuit with `num_qubits` qubits.
    ///
    /// The simulator needs an odd logical qubit count, and it always adds
    /// [`RESERVED_LOGICAL_QUBITS`], so an even input is padded by one qubit.
    /// The job name ends in `_n<num_compile_qubits>`; the simulator parses it.
    #[must_use]
    pub fn for_circuit(num_qubits: usize) -> Self {
        let num_compile_qubits = if num_qubits % 2 == 1 { num_qubits } else { num_qubits + 1 };
        Self {
            job_name: format!("trace_{}_n{num_compile_qubits}", Uuid::new_v4().simple()),
            num_circuit_qubits: num_qubits,
            num_compile_qubits,
            num_logical_qubits: num_compile_qubits + RESERVED_LOGICAL_QUBITS,
        }
    }

    /// The compile request for `circuit`.
    #[must_use]
    pub fn request(&self, circuit: &str) -> CompileRequest {
        CompileRequest {
            circuit: circuit.to_string(),
            job_name: self.job_name.clone(),
            num_circuit_qubits: self.num_circuit_qubits,
            num_compile_qubits: self.num_compile_qubits,
        }
    }

    /// Data qubits first, then padding, then the reserved qubits.
    #[must_use]
    pub fn logical_qubit_mapping(&self) -> Vec<LogicalQubit> {
        (0..self.num_logical_qubits)
            .map(|index| {
                let (role, circuit_qubit) = if index < self.num_circuit_qubits {
                    (QubitRole::Data, Some(index))
                } else if index < self.num_compile_qubits {
                    (QubitRole::Padding, None)
                } else {
                    (QubitRole::Ancilla, None)
                };
                LogicalQubit {
                    index,
                    role,
                    circuit_qubit,
                }
            })
            .collect()
    }
}

/// Removes compiler artifacts when released or dropped.
#[derive(Debug)]
pub struct ArtifactGuard {
    paths: Vec<PathBuf>,
    keep: bool,
}

impl ArtifactGuard {
    /// Guards `paths`; with `keep` set nothing is removed.
    #[must_use]
    pub fn new(paths: Vec<PathBuf>, keep: bool) -> Self {
        Self { paths, keep }
    }

    /// The guarded paths.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Removes the artifacts now, returning one message per failed removal.
    /// Files that are already gone are not failures.
    #[must_use]
    pub fn release(mut self) -> Vec<String> {
        self.clean()
    }

    fn clean(&mut self) -> Vec<String> {
        let paths = std::mem::take(&mut self.paths);
        if self.keep {
            if !paths.is_empty() {
                tracing::info!(count = paths.len(), "keeping compiler artifacts");
            }
            return Vec::new();
        }

        let mut errors = Vec::new();
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed compiler artifact"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => errors.push(format!("failed to remove {}: {e}", path.display())),
            }
        }
        errors
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        for error in self.clean() {
            tracing::warn!(%error, "artifact cleanup failed");
        }
    }
}
