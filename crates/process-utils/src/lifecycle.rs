//! Termination and bounded exit waits for tokio children.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;

/// Outcome of a child that reached a terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, `None` when the child was ended by a signal.
    pub code: Option<i32>,
    /// Whether the child exited with status zero.
    pub success: bool,
    /// Last lines the child wrote to stderr.
    pub stderr_tail: Vec<String>,
}

impl ExitReport {
    pub fn from_status(status: ExitStatus, stderr_tail: Vec<String>) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
            stderr_tail,
        }
    }
}

/// Ask a child to exit.
///
/// On Unix this delivers `SIGTERM`; elsewhere the child is killed outright.
/// Returns `Ok(false)` when the child had already exited, which is not a failure.
pub fn request_termination(child: &mut Child) -> io::Result<bool> {
    if child.try_wait()?.is_some() {
        return Ok(false);
    }
    let Some(pid) = child.id() else {
        return Ok(false);
    };

    #[cfg(unix)]
    {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: kill(2) only takes plain integers and touches no memory.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(false);
        }
        Err(err)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        child.start_kill()?;
        Ok(true)
    }
}

/// Wait up to `timeout` for the child to exit.
///
/// Returns `Ok(None)` if the child is still running once the timeout elapses.
pub async fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> io::Result<Option<ExitStatus>> {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status.map(Some),
        Err(_) => Ok(None),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tokio_command;

    fn sh(script: &str) -> Child {
        tokio_command("/bin/sh")
            .args(["-c", script])
            .spawn()
            .expect("spawn /bin/sh")
    }

    #[tokio::test]
    async fn test_terminate_running_child() {
        let mut child = sh("sleep 30");

        assert!(request_termination(&mut child).unwrap());
        let status = wait_with_timeout(&mut child, Duration::from_secs(5))
            .await
            .unwrap()
            .expect("child should exit after SIGTERM");
        assert!(!status.success());

        let report = ExitReport::from_status(status, vec![]);
        assert_eq!(report.code, None);
        assert!(!report.success);
    }

    #[tokio::test]
    async fn test_terminate_exited_child_is_not_an_error() {
        let mut child = sh("exit 0");
        child.wait().await.unwrap();

        assert!(!request_termination(&mut child).unwrap());
    }

    #[tokio::test]
    async fn test_wait_times_out_when_term_is_ignored() {
        let mut child = sh("trap '' TERM; sleep 30");
        // Give the shell a moment to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(request_termination(&mut child).unwrap());
        let status = wait_with_timeout(&mut child, Duration::from_millis(300))
            .await
            .unwrap();
        assert!(status.is_none());

        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_code_reported() {
        let mut child = sh("exit 3");
        let status = wait_with_timeout(&mut child, Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();

        let report = ExitReport::from_status(status, vec!["boom".to_string()]);
        assert_eq!(report.code, Some(3));
        assert!(!report.success);
        assert_eq!(report.stderr_tail, vec!["boom".to_string()]);
    }
}
