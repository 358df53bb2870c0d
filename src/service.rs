//! Request/response orchestration: validate, compile, simulate, report.
//!
//! `TraceService` is the entry point an outer transport calls. It owns no
//! process-wide state itself; serialization comes from the trace gate.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::compiler::{ArtifactGuard, CircuitCompiler, CompilePlan};
use crate::config::{CircuitLimits, TraceConfig};
use crate::driver::TraceDriver;
use crate::error::{ExecutionError, TraceResult, ValidationError};
use crate::escape::{self, Contained};
use crate::gate::TraceGate;
use crate::report::TraceReport;
use crate::sim::{SimulatorFactory, SimulatorSetup};

/// One trace request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRequest {
    /// Circuit description in the compiler's input language.
    pub circuit: String,
    /// Hardware configuration; the service default when unset.
    pub config_name: Option<String>,
    /// Keep compiler artifacts; the service default when unset.
    pub keep_artifacts: Option<bool>,
    /// Periodic driver diagnostics; the service default when unset.
    pub verbose: Option<bool>,
}

impl TraceRequest {
    /// A request with service defaults.
    pub fn new(circuit: impl Into<String>) -> Self {
        Self {
            circuit: circuit.into(),
            ..Self::default()
        }
    }
}

/// Health report for an outer transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub trace_in_progress: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub limits: CircuitLimits,
}

/// Runs traces against a compiler and a simulator factory.
#[derive(Debug)]
pub struct TraceService<C, F> {
    compiler: C,
    factory: F,
    config: TraceConfig,
}

impl<C, F> TraceService<C, F>
where
    C: CircuitCompiler,
    F: SimulatorFactory,
{
    /// Creates a service with a validated configuration.
    ///
    /// # Errors
    /// `InvalidConfig` if `config` fails validation.
    pub fn new(compiler: C, factory: F, config: TraceConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            compiler,
            factory,
            config,
        })
    }

    /// The service configuration.
    #[must_use]
    pub const fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Gate state and admission limits.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        let gate = TraceGate::status();
        HealthStatus {
            status: "ok".to_string(),
            trace_in_progress: gate.in_progress,
            started_at: gate.started_at,
            limits: self.config.limits.clone(),
        }
    }

    /// Traces one circuit.
    ///
    /// Empty and oversized inputs are rejected before the gate. Everything else
    /// runs while holding it.
    ///
    /// # Errors
    /// - `ValidationError` for rejected input
    /// - `ExecutionError::TraceInProgress` if another trace is running
    /// - `ExecutionError` for compile, setup or simulation failures
    pub fn trace(&self, request: &TraceRequest) -> TraceResult<TraceReport> {
        let limits = &self.config.limits;
        limits.check_size(&request.circuit)?;

        let permit = TraceGate::try_acquire()?;
        let started = Instant::now();

        let summary = match escape::contain(|| self.compiler.inspect(&request.circuit)) {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => return Err(ValidationError::MalformedCircuit { reason: e.message }.into()),
            Err(contained) => {
                return Err(ValidationError::MalformedCircuit {
                    reason: contained_message(&contained),
                }
                .into())
            }
        };
        limits.check_summary(&summary)?;

        let config_name = request
            .config_name
            .clone()
            .unwrap_or_else(|| self.config.simulator.config_name.clone());
        let keep_artifacts = request.keep_artifacts.unwrap_or(self.config.keep_artifacts);
        let mut driver_limits = self.config.driver.clone();
        if let Some(verbose) = request.verbose {
            driver_limits.verbose = verbose;
        }

        let plan = CompilePlan::for_circuit(summary.num_qubits);
        info!(
            job = %plan.job_name,
            qubits = summary.num_qubits,
            compile_qubits = plan.num_compile_qubits,
            depth = summary.depth,
            "compiling circuit"
        );

        let artifacts = ArtifactGuard::new(self.compiler.artifacts(&plan.job_name), keep_artifacts);
        let compiled = match escape::contain(|| self.compiler.compile(&plan.request(&request.circuit))) {
            Ok(Ok(compiled)) => compiled,
            Ok(Err(e)) => return Err(ExecutionError::Compile { message: e.message }.into()),
            Err(contained) => {
                return Err(ExecutionError::Compile {
                    message: contained_message(&contained),
                }
                .into())
            }
        };

        let setup = SimulatorSetup {
            config_name: config_name.clone(),
            binary_name: compiled.binary_name.clone(),
            num_logical_qubits: plan.num_logical_qubits,
            skip_physical: self.config.simulator.skip_physical,
            num_shots: self.config.simulator.num_shots,
        };
        let sim = match escape::contain(|| self.factory.setup(&setup, &compiled)) {
            Ok(Ok(sim)) => sim,
            Ok(Err(fault)) => {
                return Err(ExecutionError::SimulatorSetup {
                    message: fault.to_string(),
                }
                .into())
            }
            Err(contained) => {
                return Err(ExecutionError::SimulatorSetup {
                    message: contained_message(&contained),
                }
                .into())
            }
        };

        let mut outcome = TraceDriver::new(sim, driver_limits, &permit).run()?;

        let cleanup_errors = artifacts.release();
        if !cleanup_errors.is_empty() {
            warn!(count = cleanup_errors.len(), "some compiler artifacts were not removed");
        }
        outcome.metadata.cleanup_errors.extend(cleanup_errors);

        info!(
            job = %plan.job_name,
            events = outcome.events.len(),
            cycles = outcome.total_cycles,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "trace complete"
        );

        Ok(TraceReport::assemble(
            permit.started_at(),
            &config_name,
            &request.circuit,
            &plan,
            compiled,
            outcome,
        ))
    }
}

fn contained_message(contained: &Contained) -> String {
    match contained {
        Contained::Exit(request) => escape::describe_exit(request),
        Contained::Panic(message) => message.clone(),
    }
}
