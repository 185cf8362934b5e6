use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use process_utils::{DEFAULT_TAIL_LINES, StderrTail, tokio_command};
use tracing::debug;

use super::handle::{ChildHandle, ProcessHandle};
use crate::config::CameraConfig;
use crate::{Error, Result};

/// Something that can start one external process on demand.
pub trait ProcessLauncher: Send + Sync + fmt::Debug {
    /// Spawn a fresh process. Called once at supervisor start and again on every restart.
    fn launch(&self, label: &str) -> Result<Box<dyn ProcessHandle>>;
}

/// A spawnable process paired with the files it produces.
///
/// Slot `i` of a supervisor is always refilled from descriptor `i`, so the
/// output file list is static metadata for the whole supervisor lifetime.
#[derive(Clone)]
pub struct ProcessDescriptor {
    label: String,
    launcher: Arc<dyn ProcessLauncher>,
    output_files: Vec<PathBuf>,
}

impl ProcessDescriptor {
    pub fn new(
        label: impl Into<String>,
        launcher: Arc<dyn ProcessLauncher>,
        output_files: Vec<PathBuf>,
    ) -> Self {
        Self {
            label: label.into(),
            launcher,
            output_files,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn output_files(&self) -> &[PathBuf] {
        &self.output_files
    }

    pub fn spawn(&self) -> Result<Box<dyn ProcessHandle>> {
        self.launcher.launch(&self.label)
    }
}

impl fmt::Debug for ProcessDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessDescriptor")
            .field("label", &self.label)
            .field("launcher", &self.launcher)
            .field("output_files", &self.output_files)
            .finish()
    }
}

/// Builds the ordered descriptor list for one camera.
pub trait ProcessDescriptorFactory: Send + Sync {
    fn descriptors(
        &self,
        camera: &CameraConfig,
        output_dir: &Path,
    ) -> Result<Vec<ProcessDescriptor>>;
}

/// Launches a program with fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl ProcessLauncher for CommandLauncher {
    fn launch(&self, label: &str) -> Result<Box<dyn ProcessHandle>> {
        debug!(process = %label, program = %self.program, args = ?self.args, "Spawning process");

        let mut child = tokio_command(&self.program)
            .args(&self.args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::ProcessSpawn {
                label: label.to_string(),
                source,
            })?;

        let stderr = child
            .stderr
            .take()
            .map(|stderr| StderrTail::forward(stderr, label, DEFAULT_TAIL_LINES));

        Ok(Box::new(ChildHandle::new(label, child, stderr)))
    }
}
