// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Generic "spawn, watch, finalize" abstraction over a child process
//! (§9 design note). The transcoder supervisor and recording manager are
//! thin policy layers on top of this.

use base::{Error, ErrorKind};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// A running child process plus the watcher task that reports its exit.
pub struct ManagedChild {
    child: Child,
    pub label: String,
}

impl ManagedChild {
    /// Spawns `program` with `args`, piping stdout/stderr to the parent's
    /// log rather than the terminal (the transcoder writes progress to
    /// stderr).
    pub fn spawn(label: impl Into<String>, program: &str, args: &[String]) -> Result<Self, Error> {
        let label = label.into();
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| {
                Error::wrap(
                    ErrorKind::ProcessFailed,
                    format!("spawning {program} for {label}"),
                    e,
                )
            })?;
        info!(%label, %program, "spawned child");
        Ok(ManagedChild { child, label })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Waits for the child to exit on its own, returning whether it exited
    /// successfully. Used by the per-session watcher task (§4.F).
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus, Error> {
        self.child.wait().await.map_err(|e| {
            Error::wrap(
                ErrorKind::Internal,
                format!("waiting for child {}", self.label),
                e,
            )
        })
    }

    /// Requests graceful termination (SIGTERM on unix), then force-kills
    /// after `grace` if the child hasn't exited.
    pub async fn stop(mut self, grace: std::time::Duration) -> Result<(), Error> {
        if let Some(pid) = self.child.id() {
            #[cfg(unix)]
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
            let _ = pid;
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                if !status.success() {
                    warn!(label = %self.label, ?status, "child exited non-zero on graceful stop");
                }
                Ok(())
            }
            Ok(Err(e)) => Err(Error::wrap(
                ErrorKind::Internal,
                format!("waiting for child {} to stop", self.label),
                e,
            )),
            Err(_) => {
                warn!(label = %self.label, "child did not exit within grace period; killing");
                self.child.start_kill().map_err(|e| {
                    Error::wrap(
                        ErrorKind::Internal,
                        format!("killing child {}", self.label),
                        e,
                    )
                })?;
                let _ = self.child.wait().await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_reports_exit_status() {
        let mut child = ManagedChild::spawn("t", "true", &[]).unwrap();
        let status = child.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn spawn_of_missing_binary_fails() {
        let err = ManagedChild::spawn("t", "/no/such/binary", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProcessFailed);
    }

    #[tokio::test]
    async fn stop_kills_a_long_running_child_within_grace() {
        let child = ManagedChild::spawn("t", "sleep", &["30".to_string()]).unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(3),
            child.stop(Duration::from_millis(100)),
        )
        .await;
        assert!(result.is_ok(), "stop() did not return within the test timeout");
        assert!(result.unwrap().is_ok());
    }
}
