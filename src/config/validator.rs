// Startup validation: every error here is fatal before any oracle process
// is spawned or any row is read.

use crate::config::types::{FilterError, Result, RunConfig};
use crate::redistribution::BuiltinLaw;

/// Problems found in a configuration. Only `errors` block a run.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Which decision source a run will use
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OracleKind {
    External,
    Local,
}

/// Validate a run configuration. Errors are returned as `FilterError::Config`;
/// warnings are left in the result for the caller to log.
pub fn validate_config(config: &RunConfig, oracle: OracleKind) -> Result<ValidationResult> {
    let mut result = ValidationResult::default();

    if oracle == OracleKind::External {
        validate_oracle(config, &mut result);
    }
    validate_extraneous(config, &mut result);
    validate_mode(config, &mut result);

    if !result.is_valid() {
        return Err(FilterError::Config(format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

fn validate_oracle(config: &RunConfig, result: &mut ValidationResult) {
    let oracle = &config.oracle;
    match oracle.executable {
        None => result.error("oracle executable must be set"),
        Some(ref exe) if !exe.exists() => result.warn(format!(
            "oracle executable {:?} does not exist yet; launch will be retried",
            exe
        )),
        Some(_) => {}
    }

    if oracle.batch_size == 0 {
        result.error("oracle batch_size cannot be zero");
    }
    if oracle.retry.max_attempts == 0 {
        result.error("retry max_attempts cannot be zero");
    }
    if oracle.retry.grace_unit_ms == 0 {
        result.warn("retry grace_unit_ms is zero; a crashing oracle may look alive");
    }
    if oracle.policy.is_empty() {
        result.warn("oracle policy name is empty");
    }
}

fn validate_extraneous(config: &RunConfig, result: &mut ValidationResult) {
    let extraneous = &config.extraneous;
    if extraneous.password_length == 0 {
        result.error("extraneous password_length cannot be zero");
    }
    if extraneous.max_synthetic_rows == 0 {
        result.error("extraneous max_synthetic_rows cannot be zero");
    }
}

fn validate_mode(config: &RunConfig, result: &mut ValidationResult) {
    if BuiltinLaw::parse(&config.mode) == Some(BuiltinLaw::None) {
        result.warn("mode 'none' discards the surplus; output mass will be below input mass");
    }
}
