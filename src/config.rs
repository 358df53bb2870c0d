//! Trace configuration.
//!
//! Defaults are usable as-is. Operators override them through `PATCHTRACE_*`
//! environment variables; unset variables keep their defaults and unparsable
//! ones are rejected.

use serde::{Deserialize, Serialize};

use crate::compiler::CircuitSummary;
use crate::driver::DriverLimits;
use crate::error::ValidationError;

/// Admission limits on the input circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitLimits {
    pub max_circuit_bytes: usize,
    pub max_qubits: usize,
    pub max_depth: usize,
    pub max_instructions: usize,
}

impl Default for CircuitLimits {
    fn default() -> Self {
        Self {
            max_circuit_bytes: 1024 * 1024, // 1 MiB
            max_qubits: 20,
            max_depth: 1000,
            max_instructions: 10_000,
        }
    }
}

impl CircuitLimits {
    /// Rejects an empty or oversized circuit description.
    ///
    /// # Errors
    /// `EmptyCircuit` or `CircuitTooLarge`.
    pub fn check_size(&self, circuit: &str) -> Result<(), ValidationError> {
        if circuit.trim().is_empty() {
            return Err(ValidationError::EmptyCircuit);
        }
        let size = circuit.len();
        if size > self.max_circuit_bytes {
            return Err(ValidationError::CircuitTooLarge {
                size,
                max: self.max_circuit_bytes,
            });
        }
        Ok(())
    }

    /// Rejects a parsed circuit over the qubit, depth or instruction limits.
    ///
    /// # Errors
    /// `TooManyQubits`, `CircuitTooDeep` or `TooManyInstructions`.
    pub fn check_summary(&self, summary: &CircuitSummary) -> Result<(), ValidationError> {
        if summary.num_qubits > self.max_qubits {
            return Err(ValidationError::TooManyQubits {
                actual: summary.num_qubits,
                max: self.max_qubits,
            });
        }
        if summary.depth > self.max_depth {
            return Err(ValidationError::CircuitTooDeep {
                actual: summary.depth,
                max: self.max_depth,
            });
        }
        if summary.num_instructions > self.max_instructions {
            return Err(ValidationError::TooManyInstructions {
                actual: summary.num_instructions,
                max: self.max_instructions,
            });
        }
        Ok(())
    }
}

/// Simulator construction options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorOptions {
    /// Named hardware configuration.
    pub config_name: String,
    /// Skip physical-level simulation; the trace only needs patch shapes.
    pub skip_physical: bool,
    pub num_shots: u32,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            config_name: "example_cmos_d5".to_string(),
            skip_physical: true,
            num_shots: 1,
        }
    }
}

/// Complete configuration of a trace service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    pub limits: CircuitLimits,
    pub driver: DriverLimits,
    pub simulator: SimulatorOptions,
    /// Keep compiler artifacts after a trace.
    pub keep_artifacts: bool,
}

impl TraceConfig {
    /// Reads overrides from the process environment.
    ///
    /// # Errors
    /// `InvalidConfig` if a variable does not parse or the result is invalid.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    /// `InvalidConfig` if a value does not parse or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |name: &str| lookup(&format!("PATCHTRACE_{name}"));

        if let Some(v) = var("MAX_CIRCUIT_BYTES") {
            config.limits.max_circuit_bytes = parse("MAX_CIRCUIT_BYTES", &v)?;
        }
        if let Some(v) = var("MAX_QUBITS") {
            config.limits.max_qubits = parse("MAX_QUBITS", &v)?;
        }
        if let Some(v) = var("MAX_DEPTH") {
            config.limits.max_depth = parse("MAX_DEPTH", &v)?;
        }
        if let Some(v) = var("MAX_INSTRUCTIONS") {
            config.limits.max_instructions = parse("MAX_INSTRUCTIONS", &v)?;
        }
        if let Some(v) = var("TIMEOUT_SECONDS") {
            let seconds: u64 = parse("TIMEOUT_SECONDS", &v)?;
            config.driver.max_wall_time_ms = seconds.saturating_mul(1000);
        }
        if let Some(v) = var("MAX_CYCLES") {
            config.driver.max_cycles = parse("MAX_CYCLES", &v)?;
        }
        if let Some(v) = var("CHECK_INTERVAL") {
            config.driver.check_interval = parse("CHECK_INTERVAL", &v)?;
        }
        if let Some(v) = var("VERBOSE") {
            config.driver.verbose = parse_flag("VERBOSE", &v)?;
        }
        if let Some(v) = var("KEEP_ARTIFACTS") {
            config.keep_artifacts = parse_flag("KEEP_ARTIFACTS", &v)?;
        }
        if let Some(v) = var("CONFIG_NAME") {
            config.simulator.config_name = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    /// `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: String| Err(ValidationError::InvalidConfig { reason });
        if self.limits.max_circuit_bytes == 0 {
            return invalid("max_circuit_bytes must be positive".to_string());
        }
        if self.limits.max_qubits == 0 {
            return invalid("max_qubits must be positive".to_string());
        }
        if self.simulator.config_name.trim().is_empty() {
            return invalid("config_name must not be empty".to_string());
        }
        if self.simulator.num_shots == 0 {
            return invalid(format!("num_shots must be positive (got {})", self.simulator.num_shots));
        }
        self.driver.validate()
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ValidationError> {
    value.trim().parse().map_err(|_| ValidationError::InvalidConfig {
        reason: format!("PATCHTRACE_{name}: cannot parse '{value}'"),
    })
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ValidationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ValidationError::InvalidConfig {
            reason: format!("PATCHTRACE_{name}: expected a boolean, got '{value}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use crate::driver::TailForcing;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = TraceConfig::default();
        assert_eq!(config.limits.max_circuit_bytes, 1_048_576);
        assert_eq!(config.limits.max_qubits, 20);
        assert_eq!(config.limits.max_depth, 1000);
        assert_eq!(config.limits.max_instructions, 10_000);
        assert_eq!(config.driver.max_wall_time_ms, 300_000);
        assert_eq!(config.driver.max_cycles, 10_000_000);
        assert_eq!(config.driver.check_interval, 1000);
        assert_eq!(config.driver.tail_forcing, TailForcing::Corroborated);
        assert_eq!(config.simulator.config_name, "example_cmos_d5");
        assert!(config.simulator.skip_physical);
        assert!(!config.keep_artifacts);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides() {
        let config = TraceConfig::from_lookup(lookup(&[
            ("PATCHTRACE_MAX_QUBITS", "8"),
            ("PATCHTRACE_TIMEOUT_SECONDS", "2"),
            ("PATCHTRACE_VERBOSE", "true"),
            ("PATCHTRACE_KEEP_ARTIFACTS", "1"),
            ("PATCHTRACE_CONFIG_NAME", "example_cmos_d7"),
        ]))
        .unwrap();
        assert_eq!(config.limits.max_qubits, 8);
        assert_eq!(config.driver.max_wall_time_ms, 2000);
        assert!(config.driver.verbose);
        assert!(config.keep_artifacts);
        assert_eq!(config.simulator.config_name, "example_cmos_d7");
        assert_eq!(config.limits.max_depth, 1000);
    }

    #[test]
    fn unparsable_values_are_rejected() {
        let err = TraceConfig::from_lookup(lookup(&[("PATCHTRACE_MAX_DEPTH", "deep")])).unwrap_err();
        assert!(err.to_string().contains("PATCHTRACE_MAX_DEPTH"));
        assert!(TraceConfig::from_lookup(lookup(&[("PATCHTRACE_VERBOSE", "maybe")])).is_err());
        assert!(TraceConfig::from_lookup(lookup(&[("PATCHTRACE_CHECK_INTERVAL", "0")])).is_err());
    }

    #[test]
    fn size_checks() {
        let limits = CircuitLimits {
            max_circuit_bytes: 16,
            ..CircuitLimits::default()
        };
        assert!(matches!(limits.check_size("  \n"), Err(ValidationError::EmptyCircuit)));
        assert!(matches!(
            limits.check_size("OPENQASM 2.0; qreg q[1];"),
            Err(ValidationError::CircuitTooLarge { max: 16, .. })
        ));
        assert!(limits.check_size("qreg q[1];").is_ok());
    }

    #[test]
    fn summary_checks() {
        let limits = CircuitLimits::default();
        let mut summary = CircuitSummary {
            num_qubits: 21,
            num_clbits: 0,
            depth: 1,
            num_instructions: 1,
        };
        assert!(matches!(
            limits.check_summary(&summary),
            Err(ValidationError::TooManyQubits { actual: 21, max: 20 })
        ));
        summary.num_qubits = 3;
        summary.depth = 1001;
        assert!(matches!(limits.check_summary(&summary), Err(ValidationError::CircuitTooDeep { .. })));
        summary.depth = 10;
        summary.num_instructions = 10_001;
        assert!(matches!(
            limits.check_summary(&summary),
            Err(ValidationError::TooManyInstructions { .. })
        ));
        summary.num_instructions = 10_000;
        assert!(limits.check_summary(&summary).is_ok());
    }
}
