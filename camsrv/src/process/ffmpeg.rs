//! ffmpeg-backed descriptor factory producing HLS renditions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use super::descriptor::{CommandLauncher, ProcessDescriptor, ProcessDescriptorFactory};
use crate::Result;
use crate::config::{CameraConfig, FfmpegSettings, SourceConfig, StreamConfig};

/// One ffmpeg invocation per source, one HLS output per configured stream.
#[derive(Debug, Clone, Default)]
pub struct FfmpegDescriptorFactory {
    settings: FfmpegSettings,
}

impl FfmpegDescriptorFactory {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self { settings }
    }

    /// Media playlist path for stream `index` of the source at `uri`.
    pub fn playlist_path(output_dir: &Path, uri: &str, index: usize) -> PathBuf {
        output_dir.join(format!("playlist_{}_{}.m3u", uri_hash(uri), index))
    }

    /// Build ffmpeg command arguments for one source.
    fn build_args(&self, source: &SourceConfig, playlists: &[PathBuf]) -> Vec<String> {
        let mut args = vec!["-loglevel".to_string(), self.settings.log_level.clone()];

        if let Some(ref decoder) = source.decoder {
            args.extend(["-vcodec".to_string(), decoder.clone()]);
        }
        args.extend(["-i".to_string(), source.uri.clone()]);

        for (stream, playlist) in source.streams.iter().zip(playlists) {
            self.push_stream_args(&mut args, stream, playlist);
        }

        args
    }

    fn push_stream_args(&self, args: &mut Vec<String>, stream: &StreamConfig, playlist: &Path) {
        args.extend(["-map".to_string(), "0".to_string()]);

        if let Some(width) = stream.width {
            args.extend(["-vf".to_string(), format!("scale={}:-1", width)]);
        }
        if let Some(framerate) = stream.framerate {
            args.extend(["-r".to_string(), framerate.to_string()]);
        }

        let list_size = self.settings.hls_list_size.to_string();
        let segments = playlist.with_extension("%03d.ts");
        args.extend([
            "-vcodec".to_string(),
            stream.encoder.clone(),
            "-an".to_string(),
            "-f".to_string(),
            "hls".to_string(),
            "-preset".to_string(),
            "ultrafast".to_string(),
            "-hls_wrap".to_string(),
            list_size.clone(),
            "-hls_flags".to_string(),
            "delete_segments".to_string(),
            "-hls_list_size".to_string(),
            list_size,
            "-hls_time".to_string(),
            self.settings.hls_time_secs.to_string(),
            "-hls_segment_filename".to_string(),
            segments.to_string_lossy().to_string(),
            playlist.to_string_lossy().to_string(),
        ]);
    }
}

impl ProcessDescriptorFactory for FfmpegDescriptorFactory {
    fn descriptors(
        &self,
        camera: &CameraConfig,
        output_dir: &Path,
    ) -> Result<Vec<ProcessDescriptor>> {
        let descriptors = camera
            .sources
            .iter()
            .enumerate()
            .map(|(source_idx, source)| {
                let playlists: Vec<PathBuf> = (0..source.streams.len())
                    .map(|idx| Self::playlist_path(output_dir, &source.uri, idx))
                    .collect();
                let args = self.build_args(source, &playlists);
                let label = format!("cam{}-src{}", camera.cam_no, source_idx);
                debug!(camera_id = %camera.cam_no, process = %label, "Built ffmpeg descriptor");

                let launcher = CommandLauncher::new(self.settings.ffmpeg_path.clone(), args);
                ProcessDescriptor::new(label, Arc::new(launcher), playlists)
            })
            .collect();

        Ok(descriptors)
    }
}

fn uri_hash(uri: &str) -> String {
    let digest = Sha256::digest(uri.as_bytes());
    hex::encode(&digest[..8])
}
