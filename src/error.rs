//! Error taxonomy for collector lifecycle management.

use thiserror::Error;

/// A collector spec that failed validation. The collector is skipped; other
/// collectors are unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("interval must be positive")]
    ZeroInterval,

    #[error("timeout must be positive")]
    ZeroTimeout,

    #[error("script_path cannot be empty")]
    EmptyScriptPath,

    #[error("script_type cannot be empty")]
    EmptyScriptType,

    #[error("unsupported script_type: {0}, supported types: shell, python2, python3")]
    UnsupportedScriptType(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("collector manager is already started")]
    AlreadyStarted,

    #[error("collector manager has been stopped and cannot be restarted")]
    Stopped,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    /// Tasks that did not reach `Stopped` within the shutdown bound. They have
    /// been aborted by the time this error is returned.
    #[error("{} collector task(s) did not stop within {timeout_secs}s: {}", .pending.len(), .pending.join(", "))]
    Timeout {
        timeout_secs: u64,
        pending: Vec<String>,
    },

    #[error("{} collector task(s) panicked: {}", .0.len(), .0.join(", "))]
    Panicked(Vec<String>),
}
