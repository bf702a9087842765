//! Hypervisor error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for hypervisor operations.
pub type HypervisorResult<T> = Result<T, HypervisorError>;

/// Errors that can occur while driving the management CLI.
#[derive(Debug, Error)]
pub enum HypervisorError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}: {}", describe_code(.code), .output.trim())]
    ExitStatus {
        program: String,
        code: Option<i32>,
        output: String,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("sample file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot {action} vCPU below index 0")]
    InvalidCpuIndex { action: &'static str },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Why a raw sample did not yield an idle percentage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no {metric} entries found")]
    NoMatchingLine { metric: String },

    #[error("trailing token {token:?} is not a number")]
    NotNumeric { token: String },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "no exit code (killed by signal)".to_string(),
    }
}
