use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::command::ToolCommand;

/// Grace period between SIGTERM and SIGKILL for an overrunning tool.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Captured output of a tool that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len());
        text.push_str(&self.stdout);
        text.push_str(&self.stderr);
        text
    }
}

/// How a single tool invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRun {
    Finished(ToolOutput),
    TimedOut,
    Failed(String),
}

/// Executes external tools on behalf of the prober.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs `command`, terminating it if it outlives `limit`.
    async fn run(&self, command: &ToolCommand, limit: Duration) -> ToolRun;
}

/// Runs real child processes through `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, command: &ToolCommand, limit: Duration) -> ToolRun {
        debug!(command = %command, limit_secs = limit.as_secs(), "spawning tool");

        let mut child = match command.to_tokio().spawn() {
            Ok(child) => child,
            Err(err) => {
                return ToolRun::Failed(format!(
                    "failed to spawn {}: {err}",
                    command.program
                ));
            }
        };

        let stdout = child.stdout.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });

        let status = match tokio::time::timeout(limit, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => return ToolRun::Failed(err.to_string()),
            Err(_) => {
                terminate(&mut child).await;
                return ToolRun::TimedOut;
            }
        };

        let collect = |handle: Option<tokio::task::JoinHandle<Vec<u8>>>| async move {
            match handle {
                Some(handle) => handle.await.unwrap_or_default(),
                None => Vec::new(),
            }
        };

        ToolRun::Finished(ToolOutput {
            success: status.success(),
            stdout: String::from_utf8_lossy(&collect(stdout).await).into_owned(),
            stderr: String::from_utf8_lossy(&collect(stderr).await).into_owned(),
        })
    }
}

/// SIGTERM first, SIGKILL once the grace period lapses.
async fn terminate(child: &mut tokio::process::Child) {
    let Some(pid) = child.id() else {
        return;
    };

    if let Err(err) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!(pid, error = %err, "SIGTERM delivery failed");
    }

    if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_err() {
        warn!(pid, "tool ignored SIGTERM, killing");
        if let Err(err) = child.kill().await {
            warn!(pid, error = %err, "failed to kill tool process");
        }
    }
}
