use anyhow::{Context, Result};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outcome of delivering a termination signal to a process
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    /// Signal was delivered
    Delivered,
    /// Process (or its group) no longer exists
    NotFound,
    /// Delivery failed with the given reason
    Failed(String),
}

/// Platform-specific delivery of graceful and forceful termination signals.
///
/// Implementations signal the whole process group where the platform allows,
/// since tunnel clients routinely fork helpers.
pub trait Terminator: Send + Sync {
    /// Graceful termination (SIGTERM on Unix)
    fn terminate(&self, pid: u32) -> SignalOutcome;

    /// Forceful kill (SIGKILL on Unix)
    fn kill(&self, pid: u32) -> SignalOutcome;
}

/// Launches external tunnel commands as managed subprocesses
pub struct ProcessRunner;

impl ProcessRunner {
    /// Spawn the command line with stdout and stderr merged into a single
    /// line stream and the child placed in its own process group where the
    /// platform allows.
    ///
    /// Spawn failure (binary missing, permission denied) is surfaced to the
    /// caller so the owning runner can log it and treat the tunnel as failed.
    pub fn spawn(command_line: &str) -> Result<ProcessHandle> {
        let argv = split_command(command_line)?;
        let (program, args) = argv
            .split_first()
            .context("command line has no program")?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn: {command_line}"))?;

        let (tx, rx) = mpsc::channel(64);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, tx);
        }

        let pid = child.id();
        debug!(command = command_line, pid, "spawned tunnel process");

        Ok(ProcessHandle {
            child,
            pid,
            command: command_line.to_string(),
            lines: rx,
        })
    }
}

/// Tokenize a command line on whitespace
pub fn split_command(command_line: &str) -> Result<Vec<String>> {
    let argv: Vec<String> = command_line
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if argv.is_empty() {
        anyhow::bail!("empty command line");
    }
    Ok(argv)
}

fn spawn_line_reader<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

/// Handle to one running tunnel subprocess
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    command: String,
    lines: mpsc::Receiver<String>,
}

impl ProcessHandle {
    /// PID recorded at spawn time
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The command line this process was spawned with
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Next line of combined stdout/stderr output. `None` once both
    /// streams have reached EOF.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Try to get the exit status without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Graceful terminate, bounded wait, then forceful kill.
    ///
    /// Idempotent: calling this on an already-exited process is a no-op.
    /// Never errors; delivery failures are logged and escalated instead.
    pub async fn terminate_then_kill(
        &mut self,
        terminator: &dyn Terminator,
        grace: Duration,
        kill_grace: Duration,
    ) {
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }
        let Some(pid) = self.child.id() else {
            return;
        };

        match terminator.terminate(pid) {
            SignalOutcome::Delivered => {
                if tokio::time::timeout(grace, self.child.wait()).await.is_ok() {
                    debug!(pid, command = %self.command, "process exited after graceful signal");
                    return;
                }
                warn!(pid, command = %self.command, "process ignored graceful signal, killing");
            }
            SignalOutcome::NotFound => return,
            SignalOutcome::Failed(reason) => {
                warn!(pid, %reason, "graceful signal failed, killing");
            }
        }

        match terminator.kill(pid) {
            SignalOutcome::Delivered | SignalOutcome::NotFound => {}
            SignalOutcome::Failed(reason) => {
                warn!(pid, %reason, "forceful signal failed");
            }
        }

        // tokio's own kill path as the backstop, then reap
        let _ = self.child.start_kill();
        if tokio::time::timeout(kill_grace, self.child.wait())
            .await
            .is_err()
        {
            warn!(pid, command = %self.command, "process survived forceful kill");
        }
    }
}
