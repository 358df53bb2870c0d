//! The trace report returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::compiler::{CompilePlan, CompiledProgram, LogicalQubit};
use crate::driver::{DriverOutcome, TerminationReason};
use crate::error::{TraceError, TraceResult};
use crate::metadata::{ForcedTermination, StabilityCheckFailure};
use crate::recorder::PatchEvent;
use crate::sim::GridShape;
use crate::snapshot::PatchSnapshot;

/// Report format version.
pub const REPORT_VERSION: u32 = 1;

/// Run description and operator-facing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub version: u32,
    pub trace_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub config: String,
    pub block_type: String,
    pub code_distance: u32,
    pub patch_grid: GridShape,
    pub num_patches: usize,
    pub total_cycles: u64,
    pub accepted_instructions: u64,
    pub elapsed_seconds: f64,
    pub termination_reason: TerminationReason,
    pub forced_terminations: Vec<ForcedTermination>,
    pub stability_check_failures: Vec<StabilityCheckFailure>,
    pub warnings: Vec<String>,
    pub cleanup_errors: Vec<String>,
}

/// Echo of the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportInput {
    pub circuit: String,
    pub num_circuit_qubits: usize,
    pub num_compile_qubits: usize,
}

/// The initial patch state and every change after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchTimeline {
    pub initial: PatchSnapshot,
    pub events: Vec<PatchEvent>,
}

/// A complete trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceReport {
    pub meta: ReportMeta,
    pub input: ReportInput,
    pub compiled: CompiledProgram,
    pub logical_qubit_mapping: Vec<LogicalQubit>,
    pub patch: PatchTimeline,
}

impl TraceReport {
    /// Assembles a report from a finished run.
    #[must_use]
    pub fn assemble(
        started_at: DateTime<Utc>,
        config: &str,
        circuit: &str,
        plan: &CompilePlan,
        compiled: CompiledProgram,
        outcome: DriverOutcome,
    ) -> Self {
        let DriverOutcome {
            initial,
            events,
            metadata,
            termination,
            total_cycles,
            accepted_instructions,
            elapsed,
            profile,
            grid,
        } = outcome;

        Self {
            meta: ReportMeta {
                version: REPORT_VERSION,
                trace_id: Uuid::new_v4(),
                started_at,
                config: config.to_string(),
                block_type: profile.block_type,
                code_distance: profile.code_distance,
                patch_grid: grid,
                num_patches: grid.num_patches(),
                total_cycles,
                accepted_instructions,
                elapsed_seconds: elapsed.as_secs_f64(),
                termination_reason: termination,
                forced_terminations: metadata.forced_terminations,
                stability_check_failures: metadata.stability_check_failures,
                warnings: metadata.warnings,
                cleanup_errors: metadata.cleanup_errors,
            },
            input: ReportInput {
                circuit: circuit.to_string(),
                num_circuit_qubits: plan.num_circuit_qubits,
                num_compile_qubits: plan.num_compile_qubits,
            },
            compiled,
            logical_qubit_mapping: plan.logical_qubit_mapping(),
            patch: PatchTimeline { initial, events },
        }
    }

    /// Whether the run ended before the simulator completed.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.meta.termination_reason.is_partial()
    }

    /// Renders the report as a JSON value.
    ///
    /// # Errors
    /// `TraceError::Internal` if serialization fails.
    pub fn to_json(&self) -> TraceResult<Json> {
        serde_json::to_value(self).map_err(|e| TraceError::internal(format!("report serialization failed: {e}")))
    }

    /// Renders the report as pretty-printed JSON text.
    ///
    /// # Errors
    /// `TraceError::Internal` if serialization fails.
    pub fn to_json_string(&self) -> TraceResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TraceError::internal(format!("report serialization failed: {e}")))
    }
}
