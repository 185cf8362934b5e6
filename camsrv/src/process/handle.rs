//! Handles to running external processes.

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::{ExitReport, StderrTail, request_termination, wait_with_timeout};
use tokio::process::Child;
use tracing::warn;

/// A live external process owned by a supervisor slot.
///
/// All methods take `&mut self`: a handle is only ever driven by the poll
/// loop that owns it.
#[async_trait]
pub trait ProcessHandle: Send + fmt::Debug {
    /// OS process id, if the process is still known to the OS.
    fn pid(&self) -> Option<u32>;

    /// Non-blocking liveness check.
    fn is_alive(&mut self) -> bool;

    /// Ask the process to exit gracefully.
    ///
    /// Returns `Ok(false)` if the process had already exited.
    fn request_termination(&mut self) -> io::Result<bool>;

    /// Wait up to `timeout` for the process to exit.
    ///
    /// `Ok(None)` means the process is still running.
    async fn wait_exit(&mut self, timeout: Duration) -> io::Result<Option<ExitReport>>;

    /// Kill the process and reap it.
    async fn force_kill(&mut self) -> io::Result<ExitReport>;
}

/// [`ProcessHandle`] backed by a tokio child process.
pub struct ChildHandle {
    label: String,
    child: Child,
    stderr: Option<StderrTail>,
}

impl ChildHandle {
    pub fn new(label: impl Into<String>, child: Child, stderr: Option<StderrTail>) -> Self {
        Self {
            label: label.into(),
            child,
            stderr,
        }
    }

    fn stderr_tail(&self) -> Vec<String> {
        self.stderr
            .as_ref()
            .map(StderrTail::snapshot)
            .unwrap_or_default()
    }
}

impl fmt::Debug for ChildHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildHandle")
            .field("label", &self.label)
            .field("pid", &self.child.id())
            .finish()
    }
}

#[async_trait]
impl ProcessHandle for ChildHandle {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(e) => {
                warn!(process = %self.label, error = %e, "Failed to poll process status");
                false
            }
        }
    }

    fn request_termination(&mut self) -> io::Result<bool> {
        request_termination(&mut self.child)
    }

    async fn wait_exit(&mut self, timeout: Duration) -> io::Result<Option<ExitReport>> {
        let status = wait_with_timeout(&mut self.child, timeout).await?;
        Ok(status.map(|status| ExitReport::from_status(status, self.stderr_tail())))
    }

    async fn force_kill(&mut self) -> io::Result<ExitReport> {
        self.child.kill().await?;
        let report = match self.child.try_wait()? {
            Some(status) => ExitReport::from_status(status, self.stderr_tail()),
            None => ExitReport {
                stderr_tail: self.stderr_tail(),
                ..Default::default()
            },
        };
        Ok(report)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use process_utils::tokio_command;
    use std::process::Stdio;

    fn spawn_sh(script: &str) -> ChildHandle {
        let mut child = tokio_command("/bin/sh")
            .args(["-c", script])
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let stderr = child
            .stderr
            .take()
            .map(|s| StderrTail::forward(s, "sh", 8));
        ChildHandle::new("sh", child, stderr)
    }

    #[tokio::test]
    async fn test_child_handle_graceful_exit() {
        let mut handle = spawn_sh("sleep 30");
        assert!(handle.is_alive());
        assert!(handle.pid().is_some());

        assert!(handle.request_termination().unwrap());
        let report = handle.wait_exit(Duration::from_secs(5)).await.unwrap();
        assert!(report.is_some());
        assert!(!handle.is_alive());
    }

    #[tokio::test]
    async fn test_child_handle_reports_dead_process() {
        let mut handle = spawn_sh("echo 'fatal error' >&2; exit 1");
        let report = handle
            .wait_exit(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.code, Some(1));
        assert!(!handle.is_alive());
        assert!(!handle.request_termination().unwrap());
    }

    #[tokio::test]
    async fn test_child_handle_force_kill() {
        let mut handle = spawn_sh("trap '' TERM; sleep 30");
        tokio::time::sleep(Duration::from_millis(200)).await;

        handle.request_termination().unwrap();
        assert!(
            handle
                .wait_exit(Duration::from_millis(200))
                .await
                .unwrap()
                .is_none()
        );

        let report = handle.force_kill().await.unwrap();
        assert!(!report.success);
        assert!(!handle.is_alive());
    }
}
