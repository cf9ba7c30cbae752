//! Out-of-process script execution.
//!
//! `ProcessRunner` spawns one interpreter process per call and holds no
//! state between calls, so concurrent invocations from different collector
//! tasks only meet in the OS process table.

use crate::core::{ExecutionResult, Outcome, ScriptRunner, ScriptType};
use async_trait::async_trait;
use chrono::Local;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

const READ_CHUNK_SIZE: usize = 4096;

/// Runs collector scripts through their interpreter with a hard deadline.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScriptRunner for ProcessRunner {
    async fn execute(&self, script_path: &str, script_type: &str, timeout: Duration) -> ExecutionResult {
        let interpreter = match script_type.parse::<ScriptType>() {
            Ok(t) => t.interpreter(),
            Err(_) => return ExecutionResult::unsupported(script_type),
        };

        let executed_at = Local::now();
        let start = Instant::now();
        debug!(script = script_path, interpreter, "Spawning collector script");

        let mut child = match Command::new(interpreter)
            .arg(script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult {
                    output: String::new(),
                    executed_at,
                    elapsed: start.elapsed(),
                    outcome: Outcome::ProcessError(format!("failed to spawn {}: {}", interpreter, e)),
                };
            }
        };

        let waited = tokio::time::timeout(timeout, wait_with_combined_output(&mut child)).await;
        let (output, outcome) = match waited {
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(script = script_path, error = %e, "Failed to kill timed out script");
                }
                // Partial output of a killed script is never reported.
                (String::new(), Outcome::Timeout)
            }
            Ok(Err(e)) => (String::new(), Outcome::ProcessError(e.to_string())),
            Ok(Ok((status, bytes))) => {
                let output = String::from_utf8_lossy(&bytes).into_owned();
                if status.success() {
                    (output, Outcome::Success)
                } else {
                    (output, Outcome::ProcessError(status.to_string()))
                }
            }
        };

        ExecutionResult {
            output,
            executed_at,
            elapsed: start.elapsed(),
            outcome,
        }
    }
}

enum Chunk {
    Stdout(io::Result<usize>),
    Stderr(io::Result<usize>),
}

/// Drains stdout and stderr into one buffer in arrival order, then reaps the child.
async fn wait_with_combined_output(child: &mut Child) -> io::Result<(ExitStatus, Vec<u8>)> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut combined = Vec::new();
    let mut out_buf = [0u8; READ_CHUNK_SIZE];
    let mut err_buf = [0u8; READ_CHUNK_SIZE];

    while stdout.is_some() || stderr.is_some() {
        let chunk = tokio::select! {
            read = read_chunk(stdout.as_mut(), &mut out_buf) => Chunk::Stdout(read),
            read = read_chunk(stderr.as_mut(), &mut err_buf) => Chunk::Stderr(read),
        };
        match chunk {
            Chunk::Stdout(read) => match read? {
                0 => stdout = None,
                n => combined.extend_from_slice(&out_buf[..n]),
            },
            Chunk::Stderr(read) => match read? {
                0 => stderr = None,
                n => combined.extend_from_slice(&err_buf[..n]),
            },
        }
    }

    let status = child.wait().await?;
    Ok((status, combined))
}

/// Reads from a pipe that may already be closed; a closed pipe never resolves.
async fn read_chunk<R: AsyncRead + Unpin>(pipe: Option<&mut R>, buf: &mut [u8]) -> io::Result<usize> {
    match pipe {
        Some(pipe) => pipe.read(buf).await,
        None => std::future::pending().await,
    }
}
