//! Process spawning and supervision.
//!
//! Commands are started with `execve`-style argv (no shell), a cleared
//! environment, and stdin from `/dev/null`. A spawned process is then
//! supervised until it exits, exceeds its timeout, or exceeds its output cap.

use crate::env_policy::EnvPolicy;
use crate::error::SpawnError;
use crate::limits::ResourceLimits;
use crate::request::ExecutionRequest;
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::timeout;

/// What happens to a child's stdout and stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Stream to the supervisor's sinks, subject to the output cap (default).
    #[default]
    Forward,

    /// Attach both streams to `/dev/null`.
    Discard,
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Exited (or was signalled) on its own.
    Exited(ExitStatus),

    /// Killed after running longer than the timeout.
    TimedOut { limit: Duration },

    /// Killed after its combined output passed the cap.
    OutputCapped { limit: usize },
}

/// Starts admitted requests as child processes.
#[derive(Debug, Clone)]
pub struct Spawner {
    env: HashMap<String, String>,
    limits: ResourceLimits,
    output: OutputMode,
}

impl Spawner {
    pub fn new(env_policy: &EnvPolicy, limits: ResourceLimits, output: OutputMode) -> Self {
        Self {
            env: env_policy.build(),
            limits,
            output,
        }
    }

    /// Environment every child receives.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Start the process for an execution request.
    ///
    /// # Errors
    ///
    /// `SpawnError::Spawn` if the OS refuses (missing binary, permission
    /// denied, resource exhaustion).
    pub fn spawn(&self, request: &ExecutionRequest) -> Result<SpawnedProcess, SpawnError> {
        let mut cmd = Command::new(request.program());
        cmd.args(request.args())
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null());

        match self.output {
            OutputMode::Forward => cmd.stdout(Stdio::piped()).stderr(Stdio::piped()),
            OutputMode::Discard => cmd.stdout(Stdio::null()).stderr(Stdio::null()),
        };

        let child = cmd.spawn().map_err(|source| SpawnError::Spawn {
            program: request.program().to_path_buf(),
            source,
        })?;

        Ok(SpawnedProcess {
            child,
            command: request.command().to_string(),
            limits: self.limits,
        })
    }
}

/// A running child, owned by whoever spawned it.
#[derive(Debug)]
pub struct SpawnedProcess {
    child: Child,
    command: String,
    limits: ResourceLimits,
}

impl SpawnedProcess {
    /// OS process id, while the child has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Registry name the process was started for.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Forward output and wait for the process to finish.
    ///
    /// Stdout goes to `out` and stderr to `err` until their combined size
    /// reaches the cap; the bytes up to the cap are always written before the
    /// process is killed. In [`OutputMode::Discard`] nothing is read.
    ///
    /// # Errors
    ///
    /// `SpawnError::Io` if reading, forwarding or waiting fails. The child
    /// is killed first.
    pub async fn supervise<O, E>(mut self, out: &mut O, err: &mut E) -> Result<Completion, SpawnError>
    where
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let pid = self.child.id();
        let limits = self.limits;
        let stdout = self.child.stdout.take();
        let stderr = self.child.stderr.take();
        let child = &mut self.child;

        let run = async move {
            let capped = match (stdout, stderr) {
                (Some(stdout), Some(stderr)) => {
                    pump(stdout, stderr, limits.max_output, out, err).await?
                }
                _ => false,
            };
            if capped {
                return Ok(None);
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(Some(status))
        };

        let result = timeout(limits.timeout, run).await;

        match result {
            Ok(Ok(Some(status))) => Ok(Completion::Exited(status)),
            Ok(Ok(None)) => {
                let _ = self.child.kill().await;
                Ok(Completion::OutputCapped {
                    limit: limits.max_output,
                })
            }
            Ok(Err(source)) => {
                let _ = self.child.kill().await;
                Err(SpawnError::Io { pid, source })
            }
            Err(_) => {
                let _ = self.child.kill().await;
                Ok(Completion::TimedOut {
                    limit: limits.timeout,
                })
            }
        }
    }
}

/// Copy both pipes to their sinks until EOF or the byte budget runs out.
///
/// Returns `true` if the budget was exceeded.
async fn pump<O, E>(
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    max_output: usize,
    out: &mut O,
    err: &mut E,
) -> std::io::Result<bool>
where
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut budget = max_output;
    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 8192];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            r = stdout.read(&mut out_buf), if out_open => {
                let n = r?;
                if n == 0 {
                    out_open = false;
                } else if !forward(&out_buf[..n], &mut budget, out).await? {
                    return Ok(true);
                }
            }
            r = stderr.read(&mut err_buf), if err_open => {
                let n = r?;
                if n == 0 {
                    err_open = false;
                } else if !forward(&err_buf[..n], &mut budget, err).await? {
                    return Ok(true);
                }
            }
        }
    }

    Ok(false)
}

/// Write as much of `chunk` as the budget allows. Returns `false` if any of
/// it had to be cut.
async fn forward<W>(chunk: &[u8], budget: &mut usize, sink: &mut W) -> std::io::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    let allowed = chunk.len().min(*budget);
    if allowed > 0 {
        sink.write_all(&chunk[..allowed]).await?;
        sink.flush().await?;
    }
    *budget -= allowed;
    Ok(allowed == chunk.len())
}
