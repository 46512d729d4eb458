//! Error types for mcp-aegis

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure-level failures.
///
/// Ordinary test failure is never an `Error` - divergence between expected
/// and actual values is reported as [`crate::diagnostics::DiagnosticError`]
/// data. This enum covers the faults that prevent a test from being
/// evaluated at all.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Test suite error: {0}")]
    Suite(String),

    #[error("Failed to start server process: {0}")]
    Spawn(String),

    #[error("Server startup timed out after {0}ms")]
    StartupTimeout(u64),

    #[error("Process is not available")]
    ProcessNotAvailable,

    #[error("Read timeout")]
    ReadTimeout,

    #[error("Read operation cancelled")]
    ReadCancelled,

    #[error("Server process exited")]
    ProcessExited,

    #[error("Failed to parse JSON message: {0}")]
    MessageParse(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether this failure kills the whole suite rather than one test.
    ///
    /// A dead process or failed startup cannot be recovered per-test; a
    /// timeout or malformed message fails the current test and the run
    /// continues with the next one.
    pub fn is_suite_fatal(&self) -> bool {
        matches!(
            self,
            Error::Spawn(_)
                | Error::StartupTimeout(_)
                | Error::ProcessExited
                | Error::ReadCancelled
                | Error::ProcessNotAvailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_match_wire_contract() {
        assert_eq!(
            Error::ProcessNotAvailable.to_string(),
            "Process is not available"
        );
        assert_eq!(Error::ReadTimeout.to_string(), "Read timeout");
        assert_eq!(Error::ReadCancelled.to_string(), "Read operation cancelled");
        assert_eq!(Error::ProcessExited.to_string(), "Server process exited");
    }

    #[test]
    fn fatality_classification() {
        assert!(Error::ProcessExited.is_suite_fatal());
        assert!(Error::StartupTimeout(5000).is_suite_fatal());
        assert!(!Error::ReadTimeout.is_suite_fatal());
        assert!(!Error::MessageParse("x".into()).is_suite_fatal());
    }
}
