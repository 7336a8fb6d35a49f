/// Core types and structures for the passfilt system
use crate::oracle::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Query ceiling announced to an oracle when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Length of passwords synthesized by the extraneous law.
pub const DEFAULT_PASSWORD_LENGTH: usize = 16;

/// Ceiling on rows the extraneous law may synthesize in one run.
pub const DEFAULT_MAX_SYNTHETIC_ROWS: usize = 10_000_000;

/// Text encoding of distribution files
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputEncoding {
    /// Every byte maps to the code point of the same value
    #[default]
    Latin1,
    /// UTF-8, invalid sequences replaced
    Utf8,
}

impl std::str::FromStr for InputEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latin1" | "latin-1" | "iso-8859-1" => Ok(InputEncoding::Latin1),
            "utf8" | "utf-8" => Ok(InputEncoding::Utf8),
            other => Err(format!("unknown input encoding: {}", other)),
        }
    }
}

/// External oracle launch settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// Oracle executable
    pub executable: Option<PathBuf>,
    /// Policy name passed as the first argument
    pub policy: String,
    /// Expected query ceiling passed as the second argument
    pub batch_size: usize,
    /// Launch retry policy
    pub retry: RetryPolicy,
    /// Wait between SIGTERM and SIGKILL on shutdown
    pub shutdown_grace_ms: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            executable: None,
            policy: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            shutdown_grace_ms: 200,
        }
    }
}

/// Settings for the extraneous law
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraneousSettings {
    /// Length of each synthetic password
    pub password_length: usize,
    /// Fixed RNG seed; entropy-seeded when absent
    pub seed: Option<u64>,
    /// Larger counts fail the law instead of exhausting memory
    pub max_synthetic_rows: usize,
}

impl Default for ExtraneousSettings {
    fn default() -> Self {
        Self {
            password_length: DEFAULT_PASSWORD_LENGTH,
            seed: None,
            max_synthetic_rows: DEFAULT_MAX_SYNTHETIC_ROWS,
        }
    }
}

/// Configuration for a single filter-and-redistribute run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Redistribution mode name or numeric alias
    pub mode: String,
    /// Keep rejected rows instead of accepted ones
    pub invert: bool,
    /// Decoding applied to the input distribution
    pub encoding: InputEncoding,
    pub oracle: OracleSettings,
    pub extraneous: ExtraneousSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: "none".to_string(),
            invert: false,
            encoding: InputEncoding::default(),
            oracle: OracleSettings::default(),
            extraneous: ExtraneousSettings::default(),
        }
    }
}

/// Custom error types for passfilt
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not launch oracle '{executable}' after {attempts} attempt(s): {reason}")]
    LaunchFailed {
        executable: String,
        attempts: u32,
        reason: String,
    },

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Oracle protocol error: {0}")]
    Protocol(String),

    #[error("Unknown redistribution mode: {0}")]
    UnknownLaw(String),

    #[error("Negative surplus {surplus} (total {total}, filtered {filtered})")]
    NegativeSurplus {
        total: f64,
        filtered: f64,
        surplus: f64,
    },

    #[error("Invalid row at line {line}: {message}")]
    InvalidRow { line: usize, message: String },

    #[error("Redistribution mode '{law}' failed: {message}")]
    Law { law: String, message: String },
}

pub type Result<T> = std::result::Result<T, FilterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_config_defaults_match_reference_tool() {
        let config = RunConfig::default();
        assert_eq!(config.mode, "none");
        assert!(!config.invert);
        assert_eq!(config.oracle.batch_size, 5000);
        assert_eq!(config.oracle.retry.max_attempts, 20);
        assert_eq!(config.extraneous.password_length, 16);
        assert_eq!(config.encoding, InputEncoding::Latin1);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: RunConfig =
            serde_json::from_str(r#"{"mode": "uniform", "oracle": {"policy": "basic8"}}"#)
                .expect("parse config");
        assert_eq!(config.mode, "uniform");
        assert_eq!(config.oracle.policy, "basic8");
        assert_eq!(config.oracle.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.oracle.executable.is_none());
    }

    #[test]
    fn encoding_parses_common_spellings() {
        assert_eq!("latin-1".parse::<InputEncoding>(), Ok(InputEncoding::Latin1));
        assert_eq!("UTF-8".parse::<InputEncoding>(), Ok(InputEncoding::Utf8));
        assert!("ebcdic".parse::<InputEncoding>().is_err());
    }
}
