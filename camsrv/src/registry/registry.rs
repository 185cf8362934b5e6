use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::command::{Command, CommandKind, CommandTicket};
use super::worker::CameraWorker;
use crate::config::AppConfig;
use crate::domain::CameraId;
use crate::manifest::MediaInspector;
use crate::process::ProcessDescriptorFactory;
use crate::{Error, Result};

struct CameraEntry {
    /// `None` once the registry is shut down.
    sender: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    pending: Arc<AtomicUsize>,
}

struct RegistryInner {
    cameras: BTreeMap<CameraId, CameraEntry>,
    workers: Mutex<JoinSet<CameraId>>,
}

/// Entry point for camera lifecycle commands.
///
/// Every configured camera gets a FIFO queue drained by its own worker task,
/// so commands for one camera never overlap while different cameras proceed
/// in parallel. `start`, `stop` and `status` only enqueue; the returned
/// [`CommandTicket`] can be awaited for the outcome.
///
/// Cloning is cheap and every clone talks to the same workers.
#[derive(Clone)]
pub struct CameraRegistry {
    inner: Arc<RegistryInner>,
}

impl CameraRegistry {
    /// Build the registry and spawn one worker per configured camera.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: &AppConfig,
        factory: Arc<dyn ProcessDescriptorFactory>,
        inspector: Arc<dyn MediaInspector>,
    ) -> Self {
        let poll = config.supervisor.poll_settings();
        let mut cameras = BTreeMap::new();
        let mut workers = JoinSet::new();

        for camera in &config.cameras {
            let camera_id = camera.cam_no;
            let (tx, rx) = mpsc::unbounded_channel();
            let pending = Arc::new(AtomicUsize::new(0));

            let worker = CameraWorker::new(
                camera.clone(),
                config.output_dir(camera_id),
                factory.clone(),
                inspector.clone(),
                poll,
                pending.clone(),
            );
            workers.spawn(async move {
                worker.run(rx).await;
                camera_id
            });

            cameras.insert(
                camera_id,
                CameraEntry {
                    sender: Mutex::new(Some(tx)),
                    pending,
                },
            );
        }

        info!(cameras = cameras.len(), "Camera registry loaded");
        Self {
            inner: Arc::new(RegistryInner {
                cameras,
                workers: Mutex::new(workers),
            }),
        }
    }

    /// Load the configuration file at `path` and build the registry from it.
    pub fn from_config_file(
        path: &Path,
        factory: Arc<dyn ProcessDescriptorFactory>,
        inspector: Arc<dyn MediaInspector>,
    ) -> Result<Self> {
        let config = AppConfig::load(path)?;
        Ok(Self::new(&config, factory, inspector))
    }

    /// Configured camera ids, ascending. Never touches the queues.
    pub fn list(&self) -> Vec<CameraId> {
        self.inner.cameras.keys().copied().collect()
    }

    pub fn contains(&self, id: CameraId) -> bool {
        self.inner.cameras.contains_key(&id)
    }

    /// Commands queued for `id` that have not finished yet.
    pub fn pending(&self, id: CameraId) -> Option<usize> {
        self.inner
            .cameras
            .get(&id)
            .map(|e| e.pending.load(Ordering::SeqCst))
    }

    pub fn start(&self, id: CameraId) -> Result<CommandTicket> {
        self.enqueue(id, CommandKind::Start)
    }

    pub fn stop(&self, id: CameraId) -> Result<CommandTicket> {
        self.enqueue(id, CommandKind::Stop)
    }

    pub fn status(&self, id: CameraId) -> Result<CommandTicket> {
        self.enqueue(id, CommandKind::Status)
    }

    fn enqueue(&self, id: CameraId, kind: CommandKind) -> Result<CommandTicket> {
        let Some(entry) = self.inner.cameras.get(&id) else {
            warn!(camera_id = %id, command = %kind, "Unknown camera, command dropped");
            return Err(Error::UnknownCamera(id));
        };

        let sender = entry.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(Error::RegistryClosed);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        entry.pending.fetch_add(1, Ordering::SeqCst);
        if tx
            .send(Command {
                kind,
                reply: reply_tx,
            })
            .is_err()
        {
            entry.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::RegistryClosed);
        }

        debug!(camera_id = %id, command = %kind, "Command queued");
        Ok(CommandTicket::new(id, kind, entry.pending.clone(), reply_rx))
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .cameras
            .values()
            .all(|e| e.sender.lock().is_none())
    }

    /// Stop every camera, close all queues and wait for the workers to exit.
    ///
    /// Commands already queued still run. Afterwards every command fails with
    /// [`Error::RegistryClosed`].
    pub async fn shutdown(&self) {
        info!("Shutting down camera registry");
        for (id, entry) in &self.inner.cameras {
            let Some(tx) = entry.sender.lock().take() else {
                continue;
            };
            let (reply_tx, _) = oneshot::channel();
            entry.pending.fetch_add(1, Ordering::SeqCst);
            if tx
                .send(Command {
                    kind: CommandKind::Stop,
                    reply: reply_tx,
                })
                .is_err()
            {
                entry.pending.fetch_sub(1, Ordering::SeqCst);
                warn!(camera_id = %id, "Camera worker already gone");
            }
        }

        let mut workers = std::mem::take(&mut *self.inner.workers.lock());
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(id) => debug!(camera_id = %id, "Camera worker joined"),
                Err(e) => warn!(error = %e, "Camera worker failed"),
            }
        }
        info!("Camera registry shut down");
    }
}

impl std::fmt::Debug for CameraRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraRegistry")
            .field("cameras", &self.list())
            .finish()
    }
}
