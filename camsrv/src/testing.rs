//! In-memory collaborators for tests.
//!
//! Nothing here spawns real processes or media tools, so supervisor and
//! registry behaviour can be driven deterministically with short poll
//! intervals.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::{
    AppConfig, CameraConfig, FfmpegSettings, SourceConfig, StreamConfig, SupervisorSettings,
};
use crate::domain::CameraId;
use crate::manifest::{ManifestEntry, ManifestSink, MediaInfo, MediaInspector};
use crate::process::{
    ExitReport, FfmpegDescriptorFactory, ProcessDescriptor, ProcessDescriptorFactory,
    ProcessHandle, ProcessLauncher,
};
use crate::supervisor::PollSettings;
use crate::{Error, Result};

/// Poll settings in the low milliseconds.
pub fn fast_poll() -> PollSettings {
    PollSettings {
        base: Duration::from_millis(10),
        step: Duration::from_millis(5),
        max: Duration::from_millis(30),
        shutdown_grace: Duration::from_millis(50),
    }
}

/// Configuration with one source of two streams per camera, rooted at `hls_dir`.
pub fn test_config(hls_dir: &Path, ids: &[u32]) -> AppConfig {
    let poll = fast_poll();
    AppConfig {
        hls_dir: hls_dir.to_path_buf(),
        supervisor: SupervisorSettings {
            poll_base_ms: poll.base.as_millis() as u64,
            poll_step_ms: poll.step.as_millis() as u64,
            poll_max_ms: poll.max.as_millis() as u64,
            shutdown_grace_ms: poll.shutdown_grace.as_millis() as u64,
        },
        ffmpeg: FfmpegSettings::default(),
        cameras: ids
            .iter()
            .map(|&id| CameraConfig {
                cam_no: CameraId::new(id),
                name: None,
                sources: vec![SourceConfig {
                    uri: format!("rtsp://camera-{}/stream", id),
                    decoder: None,
                    streams: vec![
                        StreamConfig {
                            encoder: "libx264".to_string(),
                            width: Some(320),
                            framerate: None,
                        },
                        StreamConfig {
                            encoder: "libx264".to_string(),
                            width: Some(640),
                            framerate: None,
                        },
                    ],
                }],
            })
            .collect(),
    }
}

#[derive(Debug)]
struct FakeProcessState {
    pid: u32,
    alive: AtomicBool,
}

/// A pretend process whose liveness is a shared flag.
#[derive(Debug)]
pub struct FakeProcess {
    state: Arc<FakeProcessState>,
    ignore_termination: bool,
}

impl FakeProcess {
    fn report(&self) -> ExitReport {
        ExitReport {
            code: Some(0),
            success: true,
            stderr_tail: Vec::new(),
        }
    }
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.state.pid)
    }

    fn is_alive(&mut self) -> bool {
        self.state.alive.load(Ordering::SeqCst)
    }

    fn request_termination(&mut self) -> io::Result<bool> {
        if !self.state.alive.load(Ordering::SeqCst) {
            return Ok(false);
        }
        if !self.ignore_termination {
            self.state.alive.store(false, Ordering::SeqCst);
        }
        Ok(true)
    }

    async fn wait_exit(&mut self, timeout: Duration) -> io::Result<Option<ExitReport>> {
        if self.state.alive.load(Ordering::SeqCst) {
            tokio::time::sleep(timeout).await;
        }
        if self.state.alive.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.report()))
    }

    async fn force_kill(&mut self) -> io::Result<ExitReport> {
        self.state.alive.store(false, Ordering::SeqCst);
        Ok(ExitReport {
            code: None,
            success: false,
            stderr_tail: Vec::new(),
        })
    }
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        // mirrors kill_on_drop on real children
        self.state.alive.store(false, Ordering::SeqCst);
    }
}

/// Launcher producing [`FakeProcess`]es and tracking all of them.
#[derive(Debug, Default)]
pub struct FakeLauncher {
    processes: Mutex<Vec<Arc<FakeProcessState>>>,
    spawns: AtomicUsize,
    failing_spawns: AtomicUsize,
    next_pid: AtomicU32,
    ignore_termination: bool,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes from this launcher only exit when force-killed.
    pub fn ignoring_termination(mut self) -> Self {
        self.ignore_termination = true;
        self
    }

    /// Make the next `n` launches fail.
    pub fn fail_next_spawns(&self, n: usize) {
        self.failing_spawns.store(n, Ordering::SeqCst);
    }

    /// Successful launches so far.
    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn live_count(&self) -> usize {
        self.processes
            .lock()
            .iter()
            .filter(|p| p.alive.load(Ordering::SeqCst))
            .count()
    }

    /// Make every live process exit as if it crashed.
    pub fn crash_all(&self) {
        for process in self.processes.lock().iter() {
            process.alive.store(false, Ordering::SeqCst);
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, label: &str) -> Result<Box<dyn ProcessHandle>> {
        let failing = self.failing_spawns.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_spawns.store(failing - 1, Ordering::SeqCst);
            return Err(Error::ProcessSpawn {
                label: label.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "fake spawn failure"),
            });
        }

        let state = Arc::new(FakeProcessState {
            pid: 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
            alive: AtomicBool::new(true),
        });
        self.processes.lock().push(state.clone());
        self.spawns.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeProcess {
            state,
            ignore_termination: self.ignore_termination,
        }))
    }
}

/// Descriptor factory backed by one [`FakeLauncher`] per camera.
///
/// Output files follow the ffmpeg factory's naming, so tests can write the
/// media playlists a real transcoder would produce.
#[derive(Debug, Default)]
pub struct FakeFactory {
    launchers: Mutex<HashMap<CameraId, Arc<FakeLauncher>>>,
    calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl FakeFactory {
    pub fn launcher(&self, id: CameraId) -> Arc<FakeLauncher> {
        self.launchers
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(FakeLauncher::new()))
            .clone()
    }

    /// Use `launcher` for every later start of camera `id`.
    pub fn set_launcher(&self, id: CameraId, launcher: FakeLauncher) -> Arc<FakeLauncher> {
        let launcher = Arc::new(launcher);
        self.launchers.lock().insert(id, launcher.clone());
        launcher
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next descriptor request fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl ProcessDescriptorFactory for FakeFactory {
    fn descriptors(
        &self,
        camera: &CameraConfig,
        output_dir: &Path,
    ) -> Result<Vec<ProcessDescriptor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::config(format!(
                "camera {} has an invalid source",
                camera.cam_no
            )));
        }

        let launcher = self.launcher(camera.cam_no);
        Ok(camera
            .sources
            .iter()
            .enumerate()
            .map(|(idx, source)| {
                let files = (0..source.streams.len())
                    .map(|i| FfmpegDescriptorFactory::playlist_path(output_dir, &source.uri, i))
                    .collect();
                ProcessDescriptor::new(
                    format!("cam{}-src{}", camera.cam_no, idx),
                    launcher.clone(),
                    files,
                )
            })
            .collect())
    }
}

/// Reads `"<bandwidth> <width> <height>"` from the segment file itself.
#[derive(Debug, Default)]
pub struct FakeInspector {
    calls: AtomicUsize,
}

impl FakeInspector {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaInspector for FakeInspector {
    async fn inspect(&self, path: &Path) -> Result<MediaInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::inspection(path, e.to_string()))?;

        let fields: Vec<u64> = content
            .split_whitespace()
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| Error::inspection(path, "not a fake segment"))?;
        let &[bandwidth, width, height] = fields.as_slice() else {
            return Err(Error::inspection(path, "not a fake segment"));
        };

        Ok(MediaInfo {
            bandwidth,
            width: width as u32,
            height: height as u32,
            codecs: None,
        })
    }
}

/// Write a media playlist at `playlist` whose single segment is understood by [`FakeInspector`].
pub fn write_media_playlist(
    playlist: &Path,
    bandwidth: u64,
    width: u32,
    height: u32,
) -> io::Result<PathBuf> {
    let segment = playlist.with_extension("000.ts");
    let segment_name = segment
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    std::fs::write(&segment, format!("{} {} {}", bandwidth, width, height))?;
    std::fs::write(
        playlist,
        format!(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:5\n#EXTINF:5.000000,\n{}\n",
            segment_name
        ),
    )?;
    Ok(segment)
}

/// Sink remembering every persisted snapshot.
#[derive(Debug, Default)]
pub struct CountingSink {
    persisted: Mutex<Vec<Vec<ManifestEntry>>>,
}

impl CountingSink {
    pub fn persist_count(&self) -> usize {
        self.persisted.lock().len()
    }

    pub fn last(&self) -> Option<Vec<ManifestEntry>> {
        self.persisted.lock().last().cloned()
    }

    pub fn history(&self) -> Vec<Vec<ManifestEntry>> {
        self.persisted.lock().clone()
    }
}

impl ManifestSink for CountingSink {
    fn persist(&self, entries: &[ManifestEntry]) -> Result<()> {
        self.persisted.lock().push(entries.to_vec());
        Ok(())
    }
}
