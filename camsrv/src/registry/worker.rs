//! The per-camera command worker.
//!
//! Each configured camera owns exactly one worker task. It drains the
//! camera's queue one command at a time, and is the only code that ever
//! touches the camera's active supervisor slot.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::command::{CameraStatus, Command, CommandKind, CommandOutcome};
use crate::config::CameraConfig;
use crate::manifest::{ManifestObserver, MediaInspector};
use crate::process::ProcessDescriptorFactory;
use crate::supervisor::{CameraSupervisor, Observer, PollSettings, SupervisorHandle};
use crate::{Error, Result};

struct ActiveCamera {
    supervisor: SupervisorHandle,
    manifest: Arc<ManifestObserver>,
}

pub(crate) struct CameraWorker {
    camera: CameraConfig,
    output_dir: PathBuf,
    factory: Arc<dyn ProcessDescriptorFactory>,
    inspector: Arc<dyn MediaInspector>,
    poll: PollSettings,
    pending: Arc<AtomicUsize>,
    active: Option<ActiveCamera>,
}

impl CameraWorker {
    pub fn new(
        camera: CameraConfig,
        output_dir: PathBuf,
        factory: Arc<dyn ProcessDescriptorFactory>,
        inspector: Arc<dyn MediaInspector>,
        poll: PollSettings,
        pending: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            camera,
            output_dir,
            factory,
            inspector,
            poll,
            pending,
            active: None,
        }
    }

    /// Drain `rx` until every sender is gone, then stop whatever is still running.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let camera_id = self.camera.cam_no;
        debug!(camera_id = %camera_id, "Camera worker started");

        while let Some(command) = rx.recv().await {
            debug!(camera_id = %camera_id, command = %command.kind, "Executing command");
            let outcome = match command.kind {
                CommandKind::Start => self.start().await,
                CommandKind::Stop => self.stop().await,
                CommandKind::Status => CommandOutcome::Status {
                    status: self.status(),
                },
            };
            self.pending.fetch_sub(1, Ordering::SeqCst);
            // The caller may have dropped its ticket.
            let _ = command.reply.send(outcome);
        }

        if self.active.is_some() {
            self.stop().await;
        }
        debug!(camera_id = %camera_id, "Camera worker exited");
    }

    async fn start(&mut self) -> CommandOutcome {
        let camera_id = self.camera.cam_no;
        if let Some(active) = &self.active {
            if active.supervisor.is_alive() {
                info!(camera_id = %camera_id, "Camera already running");
                return CommandOutcome::AlreadyRunning;
            }
        }
        if let Some(stale) = self.active.take() {
            warn!(camera_id = %camera_id, "Reaping supervisor that stopped on its own");
            stale.supervisor.stop().await;
        }

        match self.launch().await {
            Ok(active) => {
                info!(camera_id = %camera_id, dir = %self.output_dir.display(), "Camera started");
                self.active = Some(active);
                CommandOutcome::Started
            }
            Err(e) => {
                error!(camera_id = %camera_id, error = %e, "Failed to start camera");
                CommandOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn launch(&self) -> Result<ActiveCamera> {
        self.recreate_output_dir().await?;

        let descriptors = self.factory.descriptors(&self.camera, &self.output_dir)?;
        let supervisor = CameraSupervisor::new(self.camera.cam_no, descriptors, self.poll);
        let manifest = Arc::new(ManifestObserver::new(
            self.output_dir.clone(),
            self.inspector.clone(),
        ));
        supervisor.attach(Observer::Manifest(manifest.clone()));

        Ok(ActiveCamera {
            supervisor: supervisor.spawn(),
            manifest,
        })
    }

    async fn recreate_output_dir(&self) -> Result<()> {
        let dir = &self.output_dir;
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => debug!(dir = %dir.display(), "Removed previous output directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io_path("removing output directory", dir, e)),
        }
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::io_path("creating output directory", dir, e))
    }

    async fn stop(&mut self) -> CommandOutcome {
        let camera_id = self.camera.cam_no;
        let Some(active) = self.active.take() else {
            info!(camera_id = %camera_id, "Camera already stopped");
            return CommandOutcome::AlreadyStopped;
        };

        let report = active.supervisor.stop().await;
        info!(
            camera_id = %camera_id,
            graceful = report.graceful,
            forced = report.forced,
            "Camera stopped"
        );
        CommandOutcome::Stopped { report }
    }

    fn status(&self) -> CameraStatus {
        let camera_id = self.camera.cam_no;
        let Some(active) = &self.active else {
            return CameraStatus::idle(camera_id);
        };

        CameraStatus {
            camera_id,
            active: active.supervisor.is_alive(),
            state: Some(active.supervisor.state()),
            slots: active
                .supervisor
                .latest_snapshot()
                .map(|s| s.slots)
                .unwrap_or_default(),
            manifest: active.manifest.entries(),
        }
    }
}
