use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::CameraId;
use crate::supervisor::PollSettings;
use crate::{Error, Result};

/// Root of the camera configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory; every camera writes into `<hls_dir>/<cam_no>`.
    pub hls_dir: PathBuf,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub ffmpeg: FfmpegSettings,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

impl AppConfig {
    /// Read, decode and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "Loading camera configuration");
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "could not open configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Decode and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        debug!(cameras = config.cameras.len(), "Configuration validated");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hls_dir.as_os_str().is_empty() {
            return Err(Error::config("hls_dir must not be empty"));
        }
        if self.cameras.is_empty() {
            return Err(Error::config("no cameras declared"));
        }

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.cam_no) {
                return Err(Error::config(format!(
                    "camera {} is declared more than once",
                    camera.cam_no
                )));
            }
            camera.validate()?;
        }

        self.supervisor.validate()
    }

    pub fn camera(&self, id: CameraId) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.cam_no == id)
    }

    /// Configured camera ids in declaration order.
    pub fn camera_ids(&self) -> Vec<CameraId> {
        self.cameras.iter().map(|c| c.cam_no).collect()
    }

    /// Output directory owned by one camera.
    pub fn output_dir(&self, id: CameraId) -> PathBuf {
        self.hls_dir.join(id.to_string())
    }
}

/// Timing of the supervisor poll loop and shutdown, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorSettings {
    pub poll_base_ms: u64,
    pub poll_step_ms: u64,
    pub poll_max_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        let poll = PollSettings::default();
        Self {
            poll_base_ms: poll.base.as_millis() as u64,
            poll_step_ms: poll.step.as_millis() as u64,
            poll_max_ms: poll.max.as_millis() as u64,
            shutdown_grace_ms: poll.shutdown_grace.as_millis() as u64,
        }
    }
}

impl SupervisorSettings {
    fn validate(&self) -> Result<()> {
        if self.poll_base_ms == 0 {
            return Err(Error::config("supervisor.poll_base_ms must be positive"));
        }
        if self.poll_base_ms > self.poll_max_ms {
            return Err(Error::config(
                "supervisor.poll_base_ms must not exceed supervisor.poll_max_ms",
            ));
        }
        Ok(())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            base: Duration::from_millis(self.poll_base_ms),
            step: Duration::from_millis(self.poll_step_ms),
            max: Duration::from_millis(self.poll_max_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

/// Paths and muxer knobs for the ffmpeg/ffprobe collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FfmpegSettings {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub log_level: String,
    /// Target segment duration in seconds.
    pub hls_time_secs: u32,
    /// Segments kept in each media playlist.
    pub hls_list_size: u32,
    /// Upper bound for one ffprobe run.
    pub inspect_timeout_ms: u64,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            log_level: "warning".to_string(),
            hls_time_secs: 5,
            hls_list_size: 10,
            inspect_timeout_ms: 10_000,
        }
    }
}

/// One camera and the sources transcoded for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub cam_no: CameraId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl CameraConfig {
    fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::config(format!(
                "camera {} has no sources",
                self.cam_no
            )));
        }
        for (idx, source) in self.sources.iter().enumerate() {
            if source.uri.trim().is_empty() {
                return Err(Error::config(format!(
                    "camera {} source {} has an empty uri",
                    self.cam_no, idx
                )));
            }
            if source.streams.is_empty() {
                return Err(Error::config(format!(
                    "camera {} source {} declares no output streams",
                    self.cam_no, idx
                )));
            }
        }
        Ok(())
    }
}

/// An input consumed by a single transcoding process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub uri: String,
    /// Decoder forced on the input, e.g. `h264`.
    #[serde(default)]
    pub decoder: Option<String>,
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

/// One HLS rendition produced from a source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamConfig {
    #[serde(default = "default_encoder")]
    pub encoder: String,
    /// Scaled width, height follows the aspect ratio. `None` keeps the source size.
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub framerate: Option<u32>,
}

fn default_encoder() -> String {
    "libx264".to_string()
}
