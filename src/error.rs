//! Error types for patchtrace.
//!
//! All errors are strongly typed using thiserror. Input problems are
//! `ValidationError`s and never reach the simulator; everything that goes wrong
//! once a trace is admitted is an `ExecutionError`. Timeouts and cycle-ceiling
//! exhaustion are not errors: they end a trace with a partial report.

use thiserror::Error;

/// Validation errors raised before any simulator is constructed.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Circuit description is empty")]
    EmptyCircuit,

    #[error("Circuit description is {size} bytes, exceeds limit of {max} bytes")]
    CircuitTooLarge {
        size: usize,
        max: usize,
    },

    #[error("Number of qubits exceeds limit: {actual} > {max}")]
    TooManyQubits {
        actual: usize,
        max: usize,
    },

    #[error("Circuit depth exceeds limit: {actual} > {max}")]
    CircuitTooDeep {
        actual: usize,
        max: usize,
    },

    #[error("Number of instructions exceeds limit: {actual} > {max}")]
    TooManyInstructions {
        actual: usize,
        max: usize,
    },

    #[error("Malformed circuit: {reason}")]
    MalformedCircuit {
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors raised while an admitted trace runs.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Another trace operation is in progress")]
    TraceInProgress,

    #[error("Compile failed: {message}")]
    Compile {
        message: String,
    },

    #[error("Simulator setup failed: {message}")]
    SimulatorSetup {
        message: String,
    },

    #[error("Simulator requested process exit (code {code}) at cycle {cycle}: {diagnosis}")]
    SimulatorExit {
        code: i32,
        cycle: u64,
        diagnosis: String,
    },

    #[error("Simulator unit '{unit}' failed at cycle {cycle}: {message}")]
    SimulatorFault {
        unit: String,
        cycle: u64,
        message: String,
    },

    #[error("Unexpected failure at cycle {cycle}: {message}")]
    Unexpected {
        cycle: u64,
        message: String,
    },
}

/// Top-level error type for patchtrace.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl TraceError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if the trace was rejected because another one holds the gate.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::TraceInProgress))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.is_busy()
    }

    /// HTTP-equivalent status for a request/response transport.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Execution(e) => match e {
                ExecutionError::TraceInProgress => 429,
                ExecutionError::Compile { .. } | ExecutionError::SimulatorExit { .. } => 400,
                ExecutionError::SimulatorSetup { .. }
                | ExecutionError::SimulatorFault { .. }
                | ExecutionError::Unexpected { .. } => 500,
            },
            Self::Internal { .. } => 500,
        }
    }
}

/// Result type alias for patchtrace operations.
pub type TraceResult<T> = Result<T, TraceError>;
