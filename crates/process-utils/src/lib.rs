//! Small process-related helpers shared across the workspace.
//!
//! - [`tokio_command`] builds a command with the Windows console window suppressed.
//! - [`request_termination`] asks a child to exit (SIGTERM on Unix).
//! - [`wait_with_timeout`] waits a bounded amount of time for a child to exit.
//! - [`StderrTail`] forwards a child's stderr to `tracing` and keeps the last lines around.

#[cfg(feature = "tokio")]
use std::ffi::OsStr;

#[cfg(feature = "tokio")]
mod lifecycle;
#[cfg(feature = "tokio")]
mod stderr;

#[cfg(feature = "tokio")]
pub use lifecycle::{ExitReport, request_termination, wait_with_timeout};
#[cfg(feature = "tokio")]
pub use stderr::{DEFAULT_TAIL_LINES, StderrTail};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` suitable for a supervised child.
///
/// The window flag is applied on Windows and the child is killed if its
/// handle is dropped without being reaped.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true);
    cmd
}
