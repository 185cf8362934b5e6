//! Commands accepted by a camera worker.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::oneshot;

use crate::domain::CameraId;
use crate::manifest::ManifestEntry;
use crate::supervisor::{ShutdownReport, SlotSnapshot, SupervisorState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Start,
    Stop,
    Status,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandKind::Start => "start",
            CommandKind::Stop => "stop",
            CommandKind::Status => "status",
        })
    }
}

/// Point-in-time view of one camera, served by its worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraStatus {
    pub camera_id: CameraId,
    pub active: bool,
    pub state: Option<SupervisorState>,
    pub slots: Vec<SlotSnapshot>,
    pub manifest: Vec<ManifestEntry>,
}

impl CameraStatus {
    pub fn idle(camera_id: CameraId) -> Self {
        Self {
            camera_id,
            active: false,
            state: None,
            slots: Vec::new(),
            manifest: Vec::new(),
        }
    }
}

/// What a command did once the worker executed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Started,
    AlreadyRunning,
    Stopped { report: ShutdownReport },
    AlreadyStopped,
    Status { status: CameraStatus },
    Failed { reason: String },
}

impl CommandOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CommandOutcome::Failed { .. })
    }
}

pub(crate) struct Command {
    pub kind: CommandKind,
    pub reply: oneshot::Sender<CommandOutcome>,
}

/// Receipt for an enqueued command.
///
/// Dropping the ticket does not cancel the command.
#[derive(Debug)]
pub struct CommandTicket {
    camera_id: CameraId,
    kind: CommandKind,
    pending: Arc<AtomicUsize>,
    reply: oneshot::Receiver<CommandOutcome>,
}

impl CommandTicket {
    pub(crate) fn new(
        camera_id: CameraId,
        kind: CommandKind,
        pending: Arc<AtomicUsize>,
        reply: oneshot::Receiver<CommandOutcome>,
    ) -> Self {
        Self {
            camera_id,
            kind,
            pending,
            reply,
        }
    }

    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Commands queued for this camera that have not finished yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait for the worker to execute the command.
    pub async fn wait(self) -> CommandOutcome {
        self.reply.await.unwrap_or_else(|_| CommandOutcome::Failed {
            reason: "camera worker exited before executing the command".to_string(),
        })
    }
}
