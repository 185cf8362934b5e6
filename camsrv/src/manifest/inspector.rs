use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use process_utils::tokio_command;
use serde::Deserialize;
use tracing::trace;

use super::entry::MediaInfo;
use crate::{Error, Result};

/// Derives stream properties from a media file.
#[async_trait]
pub trait MediaInspector: Send + Sync {
    /// Fails if the file is unreadable or not a recognized container.
    async fn inspect(&self, path: &Path) -> Result<MediaInfo>;
}

const DEFAULT_INSPECT_TIMEOUT: Duration = Duration::from_secs(10);

/// [`MediaInspector`] backed by `ffprobe -print_format json`.
///
/// Each run is bounded by a timeout; a hung ffprobe is killed and reported
/// as an inspection failure.
#[derive(Debug, Clone)]
pub struct FfprobeInspector {
    ffprobe_path: String,
    timeout: Duration,
}

impl FfprobeInspector {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            timeout: DEFAULT_INSPECT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for FfprobeInspector {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    /// ffprobe reports numbers as strings.
    #[serde(default)]
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// Turn ffprobe's JSON report into [`MediaInfo`].
fn parse_ffprobe_json(path: &Path, json: &[u8]) -> Result<MediaInfo> {
    let parsed: FfprobeOutput = serde_json::from_slice(json)
        .map_err(|e| Error::inspection(path, format!("unreadable ffprobe output: {}", e)))?;

    let bandwidth = parsed
        .format
        .and_then(|f| f.bit_rate)
        .and_then(|b| b.trim().parse::<u64>().ok())
        .ok_or_else(|| Error::inspection(path, "no bit rate reported"))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .or_else(|| parsed.streams.first())
        .ok_or_else(|| Error::inspection(path, "no streams found"))?;

    let codecs: Vec<&str> = parsed
        .streams
        .iter()
        .filter_map(|s| s.codec_name.as_deref())
        .collect();

    Ok(MediaInfo {
        bandwidth,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        codecs: (!codecs.is_empty()).then(|| codecs.join(",")),
    })
}

#[async_trait]
impl MediaInspector for FfprobeInspector {
    async fn inspect(&self, path: &Path) -> Result<MediaInfo> {
        let run = tokio_command(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output();

        // The child is killed on drop when the timeout fires.
        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| Error::inspection(path, "ffprobe timed out"))?
            .map_err(|e| Error::inspection(path, format!("failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(Error::inspection(
                path,
                format!("ffprobe exited with {}", output.status),
            ));
        }

        trace!(path = %path.display(), "ffprobe finished");
        parse_ffprobe_json(path, &output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFPROBE_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_name": "h264", "codec_type": "video", "width": 320, "height": 240}
        ],
        "format": {"filename": "p.000.ts", "format_name": "mpegts", "bit_rate": "500123"}
    }"#;

    #[test]
    fn test_parse_ffprobe_json() {
        let info = parse_ffprobe_json(Path::new("p.000.ts"), FFPROBE_JSON.as_bytes()).unwrap();
        assert_eq!(info.bandwidth, 500_123);
        assert_eq!((info.width, info.height), (320, 240));
        assert_eq!(info.codecs.as_deref(), Some("h264"));
    }

    #[test]
    fn test_parse_ffprobe_json_prefers_video_stream() {
        let json = r#"{
            "streams": [
                {"codec_name": "aac", "codec_type": "audio"},
                {"codec_name": "h264", "codec_type": "video", "width": 640, "height": 480}
            ],
            "format": {"bit_rate": "1200000"}
        }"#;
        let info = parse_ffprobe_json(Path::new("x.ts"), json.as_bytes()).unwrap();
        assert_eq!((info.width, info.height), (640, 480));
        assert_eq!(info.codecs.as_deref(), Some("aac,h264"));
    }

    #[test]
    fn test_parse_ffprobe_json_without_bit_rate_fails() {
        let json = r#"{"streams": [{"codec_type": "video"}], "format": {}}"#;
        let err = parse_ffprobe_json(Path::new("x.ts"), json.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Inspection { .. }));
    }

    #[test]
    fn test_parse_ffprobe_json_garbage_fails() {
        let err = parse_ffprobe_json(Path::new("x.ts"), b"not json").unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_ffprobe_binary_is_inspection_error() {
        let inspector = FfprobeInspector::new("/nonexistent/ffprobe");
        let err = inspector.inspect(Path::new("x.ts")).await.unwrap_err();
        assert!(matches!(err, Error::Inspection { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_ffprobe_times_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("ffprobe");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 1000\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let inspector = FfprobeInspector::new(script.to_string_lossy())
            .with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = inspector.inspect(Path::new("x.ts")).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err, Error::Inspection { .. }));
        assert!(err.to_string().contains("timed out"));
    }
}
