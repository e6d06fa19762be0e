//! External command execution with concurrent stream draining and deadlines.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::ProbeError;

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// The process exited; `None` means it was ended by a signal.
    Exited(Option<i32>),
    /// The deadline fired and the process was killed.
    TimedOut(Duration),
}

/// Captured output of a finished (or killed) command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub state: ExitState,
}

impl CommandOutput {
    pub fn exited(stdout: &str, stderr: &str, code: i32) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            state: ExitState::Exited(Some(code)),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            ExitState::Exited(code) => code,
            ExitState::TimedOut(_) => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.state, ExitState::TimedOut(_))
    }
}

/// Runs diagnostic commands on behalf of the prober.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `cmd`, killing it if it is still alive after `deadline`.
    ///
    /// Output captured before a timeout is returned, not discarded.
    async fn run(&self, cmd: &CommandSpec, deadline: Option<Duration>) -> Result<CommandOutput, ProbeError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, cmd: &CommandSpec, deadline: Option<Duration>) -> Result<CommandOutput, ProbeError> {
        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProbeError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();

        let finished = {
            let collect = async {
                tokio::try_join!(drain(stdout, &mut out_buf), drain(stderr, &mut err_buf))?;
                child.wait().await
            };

            match deadline {
                Some(limit) => match tokio::time::timeout(limit, collect).await {
                    Ok(status) => Some(status?),
                    Err(_) => None,
                },
                None => Some(collect.await?),
            }
        };

        let state = match finished {
            Some(status) => ExitState::Exited(status.code()),
            None => {
                let limit = deadline.unwrap_or_default();
                tracing::warn!("Runner: `{}` exceeded {:?}, killing it", cmd, limit);
                // kill() also waits, so the child is reaped here.
                if let Err(e) = child.kill().await {
                    tracing::error!("Runner: failed to kill `{}`: {}", cmd, e);
                }
                ExitState::TimedOut(limit)
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&out_buf).into_owned(),
            stderr: String::from_utf8_lossy(&err_buf).into_owned(),
            state,
        })
    }
}

/// Read a stream to its end, appending chunk by chunk so a cancelled read
/// keeps everything received so far.
async fn drain<R: AsyncRead + Unpin>(reader: Option<R>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut chunk = [0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
