//! Running a verifier subprocess

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use papercut::VerificationStatus;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::config::Markers;
use crate::error::LaunchError;

/// One fully rendered verifier command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub mutant_id: String,
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub timeout: Duration,
}

/// How a run ended, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited; its exit code is not consulted
    Completed { output: String, duration: Duration },
    /// The process was killed at the deadline
    TimedOut { duration: Duration },
    /// The process was killed because the batch was cancelled
    Cancelled,
}

/// Something that can execute a verifier invocation.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, LaunchError>;
}

/// Classify verifier output. Fail markers win over pass markers; output with
/// neither is an error.
pub fn classify(output: &str, markers: &Markers) -> VerificationStatus {
    if markers.is_fail(output) {
        VerificationStatus::Fail
    } else if markers.is_pass(output) {
        VerificationStatus::Pass
    } else {
        VerificationStatus::Error
    }
}

/// Resolve a program name the way a shell would: explicit paths are used
/// as-is, bare names are searched on `PATH`.
pub fn resolve_program(program: &str) -> Result<PathBuf, LaunchError> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(LaunchError::ProgramNotFound(program.to_string()))
        };
    }
    which::which(program).map_err(|_| LaunchError::ProgramNotFound(program.to_string()))
}

/// Runs the verifier as a local subprocess.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandVerifier;

impl CommandVerifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, LaunchError> {
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        let program = resolve_program(&invocation.program)?;

        let mut cmd = Command::new(&program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(mutant = %invocation.mutant_id, "Running verifier: {:?}", cmd);
        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        let finished = {
            let collect = async {
                let mut stdout = String::new();
                let mut stderr = String::new();

                let (status, stdout_result, stderr_result) = tokio::join!(
                    child.wait(),
                    async {
                        if let Some(mut handle) = stdout_handle {
                            let _ = handle.read_to_string(&mut stdout).await;
                        }
                        stdout
                    },
                    async {
                        if let Some(mut handle) = stderr_handle {
                            let _ = handle.read_to_string(&mut stderr).await;
                        }
                        stderr
                    }
                );

                Ok::<_, std::io::Error>((status?, stdout_result, stderr_result))
            };

            tokio::select! {
                result = timeout(invocation.timeout, collect) => Some(result),
                () = cancel.cancelled() => None,
            }
        };

        let duration = start.elapsed();
        match finished {
            Some(Ok(Ok((status, stdout, stderr)))) => {
                debug!(
                    mutant = %invocation.mutant_id,
                    ?status,
                    elapsed_ms = duration.as_millis() as u64,
                    "verifier exited"
                );
                let mut output = stdout;
                if !stderr.is_empty() {
                    if !output.is_empty() && !output.ends_with('\n') {
                        output.push('\n');
                    }
                    output.push_str(&stderr);
                }
                Ok(RunOutcome::Completed { output, duration })
            }
            Some(Ok(Err(e))) => Err(LaunchError::Wait(e)),
            Some(Err(_)) => {
                warn!(
                    mutant = %invocation.mutant_id,
                    "verifier timed out after {:?}", invocation.timeout
                );
                let _ = child.kill().await;
                Ok(RunOutcome::TimedOut { duration })
            }
            None => {
                debug!(mutant = %invocation.mutant_id, "verifier cancelled");
                let _ = child.kill().await;
                Ok(RunOutcome::Cancelled)
            }
        }
    }
}
