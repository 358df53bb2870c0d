use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use serial_test::serial;

use patchtrace::sim::scripted::{ScriptedInstruction, ScriptedPatch, ScriptedSimulator};
use patchtrace::{
    CircuitCompiler, CircuitSummary, CompileError, CompileRequest, CompiledProgram, InstructionKind,
    SimulatorFactory, SimulatorFault, SimulatorSetup, TraceConfig, TraceGate, TraceRequest, TraceService,
};

struct OneQubitCompiler;

impl CircuitCompiler for OneQubitCompiler {
    fn inspect(&self, _circuit: &str) -> Result<CircuitSummary, CompileError> {
        Ok(CircuitSummary {
            num_qubits: 1,
            num_clbits: 0,
            depth: 1,
            num_instructions: 1,
        })
    }

    fn compile(&self, request: &CompileRequest) -> Result<CompiledProgram, CompileError> {
        Ok(CompiledProgram {
            clifford_t: request.circuit.clone(),
            instructions: vec!["PREP_INFO 0".to_string()],
            binary_name: request.job_name.clone(),
        })
    }
}

/// Blocks inside setup until released, so the gate stays held.
struct BlockingFactory {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl SimulatorFactory for BlockingFactory {
    type Simulator = ScriptedSimulator;

    fn setup(&self, setup: &SimulatorSetup, _program: &CompiledProgram) -> Result<ScriptedSimulator, SimulatorFault> {
        let _ = self.entered.send(());
        let _ = self.release.recv_timeout(Duration::from_secs(10));
        Ok(ScriptedSimulator::builder(1, setup.num_logical_qubits)
            .instruction(ScriptedInstruction::of(InstructionKind::PrepInfo).set_patch(0, ScriptedPatch::active()))
            .build())
    }
}

#[test]
#[serial]
fn concurrent_traces_fail_fast_while_one_runs() {
    let (entered_tx, entered_rx) = bounded::<()>(1);
    let (release_tx, release_rx) = bounded::<()>(1);
    let service = Arc::new(
        TraceService::new(
            OneQubitCompiler,
            BlockingFactory {
                entered: entered_tx,
                release: release_rx,
            },
            TraceConfig::default(),
        )
        .unwrap(),
    );

    let running = {
        let service = Arc::clone(&service);
        thread::spawn(move || service.trace(&TraceRequest::new("qubits 1")))
    };
    entered_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    let health = service.health();
    assert!(health.trace_in_progress);
    assert!(health.started_at.is_some());

    let rejected: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let started = Instant::now();
                let result = service.trace(&TraceRequest::new("qubits 1")).map(|_| ());
                (result, started.elapsed())
            })
        })
        .collect();
    for handle in rejected {
        let (result, elapsed) = handle.join().unwrap();
        let err = result.unwrap_err();
        assert!(err.is_busy());
        assert_eq!(err.status_code(), 429);
        assert!(elapsed < Duration::from_millis(500), "rejection took {elapsed:?}");
    }

    release_tx.send(()).unwrap();
    let report = running.join().unwrap().unwrap();
    assert_eq!(report.patch.events.len(), 1);

    assert!(!service.health().trace_in_progress);
    assert!(!TraceGate::status().in_progress);
}

#[test]
#[serial]
fn input_validation_does_not_take_the_gate() {
    let _permit = TraceGate::try_acquire().unwrap();
    let (entered, _) = bounded::<()>(1);
    let (_, release) = bounded::<()>(1);
    let service = TraceService::new(OneQubitCompiler, BlockingFactory { entered, release }, TraceConfig::default())
        .unwrap();

    let err = service.trace(&TraceRequest::new("")).unwrap_err();
    assert!(err.is_validation());
    let err = service.trace(&TraceRequest::new("qubits 1")).unwrap_err();
    assert!(err.is_busy());
}
