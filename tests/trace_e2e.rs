use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serial_test::serial;

use patchtrace::sim::scripted::{ScriptedInstruction, ScriptedPatch, ScriptedSimulator};
use patchtrace::{
    CircuitCompiler, CircuitSummary, CompileError, CompileRequest, CompiledProgram, ExecutionError, InstructionKind,
    QubitRole, SimulatorFactory, SimulatorFault, SimulatorSetup, TerminationReason, TraceConfig, TraceError,
    TraceGate, TraceRequest, TraceService, ValidationError,
};

/// Toy circuit language: a `qubits N` header, then `prep i`, `merge i j`,
/// `split i j`, `measure i` or `abort` lines.
struct FileCompiler {
    dir: PathBuf,
    compiles: Arc<AtomicUsize>,
}

impl FileCompiler {
    fn paths(&self, job_name: &str) -> Vec<PathBuf> {
        ["qasm", "qisa", "qbin"]
            .iter()
            .map(|ext| self.dir.join(format!("{job_name}.{ext}")))
            .collect()
    }
}

impl CircuitCompiler for FileCompiler {
    fn inspect(&self, circuit: &str) -> Result<CircuitSummary, CompileError> {
        let mut lines = circuit.lines().map(str::trim).filter(|l| !l.is_empty());
        let num_qubits = lines
            .next()
            .and_then(|h| h.strip_prefix("qubits "))
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| CompileError::new("expected 'qubits N' header"))?;
        let gates = lines.count();
        Ok(CircuitSummary {
            num_qubits,
            num_clbits: 0,
            depth: gates,
            num_instructions: gates,
        })
    }

    fn compile(&self, request: &CompileRequest) -> Result<CompiledProgram, CompileError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        for path in self.paths(&request.job_name) {
            std::fs::write(&path, &request.circuit).map_err(|e| CompileError::new(e.to_string()))?;
        }

        let mut instructions = Vec::new();
        for line in request.circuit.lines().skip(1).map(str::trim).filter(|l| !l.is_empty()) {
            let mut words = line.split_whitespace();
            let op = words.next().unwrap_or_default();
            let args: Vec<&str> = words.collect();
            let mnemonic = match op {
                "prep" => "PREP_INFO",
                "merge" => "MERGE_INFO",
                "split" => "SPLIT_INFO",
                "measure" => "LQM_Z",
                "abort" => "ABORT",
                other => return Err(CompileError::new(format!("unsupported gate '{other}'"))),
            };
            instructions.push(std::iter::once(mnemonic).chain(args).collect::<Vec<_>>().join(" "));
        }

        Ok(CompiledProgram {
            clifford_t: request.circuit.clone(),
            instructions,
            binary_name: request.job_name.clone(),
        })
    }

    fn artifacts(&self, job_name: &str) -> Vec<PathBuf> {
        self.paths(job_name)
    }
}

/// Builds a two-row scripted grid, one column per logical qubit.
struct ScriptFactory {
    natural_completion: bool,
}

impl SimulatorFactory for ScriptFactory {
    type Simulator = ScriptedSimulator;

    fn setup(&self, setup: &SimulatorSetup, program: &CompiledProgram) -> Result<ScriptedSimulator, SimulatorFault> {
        let mut builder = ScriptedSimulator::builder(2, setup.num_logical_qubits)
            .natural_completion(self.natural_completion)
            .settle_after(20);

        for (position, line) in program.instructions.iter().enumerate() {
            let words: Vec<&str> = line.split_whitespace().collect();
            let index = |i: usize| -> Result<usize, SimulatorFault> {
                words
                    .get(i)
                    .and_then(|w| w.parse().ok())
                    .ok_or_else(|| SimulatorFault::new("qif", format!("bad operand in '{line}'")))
            };
            let instruction = match words.first().copied() {
                Some("PREP_INFO") => {
                    ScriptedInstruction::of(InstructionKind::PrepInfo).set_patch(index(1)?, ScriptedPatch::active())
                }
                Some("MERGE_INFO") => ScriptedInstruction::of(InstructionKind::MergeInfo)
                    .set_patch(index(1)?, ScriptedPatch::active().merged())
                    .set_patch(index(2)?, ScriptedPatch::active().merged()),
                Some("SPLIT_INFO") => ScriptedInstruction::of(InstructionKind::SplitInfo)
                    .set_patch(index(1)?, ScriptedPatch::active())
                    .set_patch(index(2)?, ScriptedPatch::active()),
                Some("LQM_Z") => ScriptedInstruction::of(InstructionKind::LqmZ),
                Some("ABORT") => {
                    builder = builder.exit_at(position as u64, 1, Some("invalid pchpp in PIU.dyndec"));
                    ScriptedInstruction::of(InstructionKind::Lqi)
                }
                _ => return Err(SimulatorFault::new("qif", format!("unknown instruction '{line}'"))),
            };
            builder = builder.instruction(instruction);
        }
        Ok(builder.build())
    }
}

fn service(dir: &Path, config: TraceConfig, natural_completion: bool) -> TraceService<FileCompiler, ScriptFactory> {
    let compiler = FileCompiler {
        dir: dir.to_path_buf(),
        compiles: Arc::new(AtomicUsize::new(0)),
    };
    TraceService::new(compiler, ScriptFactory { natural_completion }, config).unwrap()
}

fn leftover_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

const MERGE_SPLIT: &str = "qubits 2\nprep 0\nprep 1\nmerge 0 1\nmeasure 0\nsplit 0 1\n";

#[test]
#[serial]
fn trace_report_records_every_patch_change() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), TraceConfig::default(), true);

    let report = svc.trace(&TraceRequest::new(MERGE_SPLIT)).unwrap();
    let json = report.to_json().unwrap();

    assert_eq!(json["meta"]["version"], 1);
    assert_eq!(json["meta"]["patch_grid"]["rows"], 2);
    assert_eq!(json["meta"]["patch_grid"]["cols"], 5);
    assert_eq!(json["meta"]["num_patches"], 10);
    assert_eq!(json["meta"]["termination_reason"], "normal");
    assert_eq!(json["meta"]["accepted_instructions"], 5);
    assert_eq!(json["input"]["num_circuit_qubits"], 2);
    assert_eq!(json["compiled"]["instructions"][2], "MERGE_INFO 0 1");

    let events = &report.patch.events;
    let kinds: Vec<InstructionKind> = events.iter().map(|e| e.instruction_kind).collect();
    assert_eq!(
        kinds,
        vec![
            InstructionKind::PrepInfo,
            InstructionKind::PrepInfo,
            InstructionKind::MergeInfo,
            InstructionKind::SplitInfo
        ]
    );
    let positions: Vec<u64> = events.iter().map(|e| e.instruction_position).collect();
    assert_eq!(positions, vec![0, 1, 2, 4]);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence_number, i as u64);
    }
    assert!(events.windows(2).all(|w| w[0].cycle <= w[1].cycle));

    let merged = &events[2].patch_delta.records();
    assert_eq!(merged.len(), 2);
    assert!(merged.iter().all(|r| r.merged.reg == 1 && r.merged.mem == 1));

    let data = report
        .logical_qubit_mapping
        .iter()
        .filter(|q| q.role == QubitRole::Data)
        .count();
    assert_eq!(data, 2);
    assert_eq!(leftover_files(dir.path()), 0);
}

#[test]
#[serial]
fn artifacts_are_kept_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), TraceConfig::default(), true);
    let request = TraceRequest {
        keep_artifacts: Some(true),
        ..TraceRequest::new("qubits 1\nprep 0")
    };
    svc.trace(&request).unwrap();
    assert_eq!(leftover_files(dir.path()), 3);
}

#[test]
#[serial]
fn lagging_measurement_unit_is_forced_once_stable() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), TraceConfig::default(), false);

    let report = svc.trace(&TraceRequest::new("qubits 1\nprep 0")).unwrap();
    assert_eq!(report.meta.termination_reason, TerminationReason::SystemStable);
    assert_eq!(report.meta.total_cycles, 20);
    assert_eq!(report.meta.forced_terminations.len(), 1);
    assert_eq!(report.meta.forced_terminations[0].unit, "lmu");
    assert_eq!(report.patch.events.len(), 1);

    let json = report.to_json().unwrap();
    assert_eq!(json["meta"]["forced_terminations"][0]["reason"], "system_stable");
}

#[test]
#[serial]
fn simulator_exit_is_reported_and_next_trace_runs() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), TraceConfig::default(), true);

    let err = svc.trace(&TraceRequest::new("qubits 1\nprep 0\nabort")).unwrap_err();
    let TraceError::Execution(ExecutionError::SimulatorExit { code, diagnosis, .. }) = &err else {
        panic!("expected SimulatorExit, got {err:?}");
    };
    assert_eq!(*code, 1);
    assert!(diagnosis.contains("pchpp"));
    assert_eq!(err.status_code(), 400);
    assert_eq!(leftover_files(dir.path()), 0);
    assert!(!TraceGate::status().in_progress);

    assert!(svc.trace(&TraceRequest::new("qubits 1\nprep 0")).is_ok());
}

#[test]
#[serial]
fn compile_failure_still_removes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path(), TraceConfig::default(), true);

    let err = svc.trace(&TraceRequest::new("qubits 1\ntoffoli 0")).unwrap_err();
    assert!(matches!(err, TraceError::Execution(ExecutionError::Compile { .. })));
    assert_eq!(leftover_files(dir.path()), 0);
}

#[test]
#[serial]
fn limits_reject_input_before_compiling() {
    let dir = tempfile::tempdir().unwrap();
    let compiles = Arc::new(AtomicUsize::new(0));
    let mut config = TraceConfig::default();
    config.limits.max_qubits = 3;
    config.limits.max_circuit_bytes = 64;
    let svc = TraceService::new(
        FileCompiler {
            dir: dir.path().to_path_buf(),
            compiles: Arc::clone(&compiles),
        },
        ScriptFactory {
            natural_completion: true,
        },
        config,
    )
    .unwrap();

    let wide = svc.trace(&TraceRequest::new("qubits 4\nprep 0")).unwrap_err();
    assert!(matches!(
        wide,
        TraceError::Validation(ValidationError::TooManyQubits { actual: 4, max: 3 })
    ));

    let long = "qubits 1\n".to_string() + &"prep 0\n".repeat(20);
    let large = svc.trace(&TraceRequest::new(long)).unwrap_err();
    assert!(matches!(large, TraceError::Validation(ValidationError::CircuitTooLarge { .. })));

    let empty = svc.trace(&TraceRequest::new("")).unwrap_err();
    assert!(matches!(empty, TraceError::Validation(ValidationError::EmptyCircuit)));

    assert_eq!(compiles.load(Ordering::SeqCst), 0);
    assert_eq!(leftover_files(dir.path()), 0);
}

#[test]
#[serial]
fn timeout_returns_partial_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = TraceConfig::default();
    config.driver.max_wall_time_ms = 50;
    config.driver.check_interval = 10;
    config.driver.max_cycles = u64::MAX;
    let svc = TraceService::new(
        FileCompiler {
            dir: dir.path().to_path_buf(),
            compiles: Arc::new(AtomicUsize::new(0)),
        },
        // Never settles: the pipeline stays busy after the script.
        NeverSettles,
        config,
    )
    .unwrap();

    let report = svc.trace(&TraceRequest::new("qubits 1\nprep 0")).unwrap();
    assert_eq!(report.meta.termination_reason, TerminationReason::Timeout);
    assert!(report.is_partial());
    assert_eq!(report.patch.events.len(), 1);
    assert_eq!(report.meta.forced_terminations[0].unit, "driver");
    assert!(!report.meta.warnings.is_empty());
}

struct NeverSettles;

impl SimulatorFactory for NeverSettles {
    type Simulator = ScriptedSimulator;

    fn setup(&self, setup: &SimulatorSetup, _program: &CompiledProgram) -> Result<ScriptedSimulator, SimulatorFault> {
        Ok(ScriptedSimulator::builder(1, setup.num_logical_qubits)
            .instruction(ScriptedInstruction::of(InstructionKind::PrepInfo).set_patch(0, ScriptedPatch::active()))
            .settle_after(u64::MAX)
            .natural_completion(false)
            .build())
    }
}
