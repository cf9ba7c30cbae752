//! Core domain types and service traits for the exporter
//!
//! This module defines the data model shared by the runner, the collector
//! tasks and the registry, together with the `ScriptRunner` trait that sits
//! at the seam between scheduling and process execution.

use crate::error::SpecError;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Timestamp layout used in provenance comments.
pub const EXEC_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Identifies one collector within one cluster.
///
/// Rendered as `cluster:collector` wherever a flat key is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectorKey {
    pub cluster: String,
    pub collector: String,
}

impl CollectorKey {
    pub fn new(cluster: impl Into<String>, collector: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            collector: collector.into(),
        }
    }
}

impl fmt::Display for CollectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cluster, self.collector)
    }
}

/// The interpreter family a collector script is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    Shell,
    Python2,
    Python3,
}

impl ScriptType {
    /// The interpreter binary that receives the script path as its only argument.
    pub fn interpreter(&self) -> &'static str {
        match self {
            ScriptType::Shell => "bash",
            ScriptType::Python2 => "python2",
            ScriptType::Python3 => "python3",
        }
    }
}

impl FromStr for ScriptType {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shell" => Ok(ScriptType::Shell),
            "python2" => Ok(ScriptType::Python2),
            // Older configurations spell python3 as plain "python".
            "python3" | "python" => Ok(ScriptType::Python3),
            other => Err(SpecError::UnsupportedScriptType(other.to_string())),
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptType::Shell => "shell",
            ScriptType::Python2 => "python2",
            ScriptType::Python3 => "python3",
        };
        f.write_str(name)
    }
}

/// Execution parameters for a single collector, fixed for the lifetime of its task.
///
/// `script_type` is kept as written in the configuration; it is resolved to a
/// [`ScriptType`] when the task validates the spec and again by the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorSpec {
    pub script_path: String,
    pub script_type: String,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub enabled: bool,
}

impl CollectorSpec {
    /// Checks the invariants a task needs before it may enter `Running`.
    pub fn validate(&self) -> Result<ScriptType, SpecError> {
        if self.interval_seconds == 0 {
            return Err(SpecError::ZeroInterval);
        }
        if self.timeout_seconds == 0 {
            return Err(SpecError::ZeroTimeout);
        }
        if self.script_path.trim().is_empty() {
            return Err(SpecError::EmptyScriptPath);
        }
        if self.script_type.trim().is_empty() {
            return Err(SpecError::EmptyScriptType);
        }
        self.script_type.parse()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Classification of one runner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Timeout,
    /// Non-zero exit or spawn failure, with the underlying error text.
    ProcessError(String),
    /// The script type was not recognised; nothing was spawned.
    UnsupportedType(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Short label used for metric labels and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Timeout => "timeout",
            Outcome::ProcessError(_) => "process_error",
            Outcome::UnsupportedType(_) => "unsupported_type",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Timeout => write!(f, "script timed out"),
            Outcome::ProcessError(e) => write!(f, "error executing script: {}", e),
            Outcome::UnsupportedType(t) => write!(f, "unsupported script type: {}", t),
        }
    }
}

/// The transient result of one invocation, folded into a snapshot by the task.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: String,
    pub executed_at: DateTime<Local>,
    pub elapsed: Duration,
    pub outcome: Outcome,
}

impl ExecutionResult {
    /// A result for an invocation that never reached process spawn.
    pub fn unsupported(script_type: &str) -> Self {
        Self {
            output: String::new(),
            executed_at: Local::now(),
            elapsed: Duration::ZERO,
            outcome: Outcome::UnsupportedType(script_type.to_string()),
        }
    }
}

/// The latest published state of one collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorSnapshot {
    pub formatted_output: String,
    pub healthy: bool,
    pub last_updated: DateTime<Local>,
}

impl CollectorSnapshot {
    /// Folds an execution result into a displayable snapshot.
    ///
    /// Failed outcomes keep the preamble and provenance line but replace the
    /// script output with an `# Error:` comment, so a reader never sees stale
    /// output next to an unhealthy flag.
    pub fn from_result(key: &CollectorKey, spec: &CollectorSpec, result: &ExecutionResult) -> Self {
        let name = &key.collector;
        let exec_time = result.executed_at.format(EXEC_TIME_FORMAT);
        let mut text = format!(
            "# HELP {name} Metric collected from external script\n# TYPE {name} gauge\n# Script: {}, exec_time: {}\n",
            spec.script_path, exec_time
        );
        match &result.outcome {
            Outcome::Success => text.push_str(&result.output),
            failure => {
                text.push_str("# Error: ");
                // Keep the error on comment lines so the document stays parseable.
                text.push_str(&failure.to_string().replace('\n', " "));
            }
        }

        Self {
            formatted_output: text,
            healthy: result.outcome.is_success(),
            last_updated: Local::now(),
        }
    }
}

/// Executes one external script under a deadline.
///
/// Implementations must be safe to call concurrently from many tasks; calls
/// for different collectors must not serialize on each other.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn execute(&self, script_path: &str, script_type: &str, timeout: Duration) -> ExecutionResult;
}
