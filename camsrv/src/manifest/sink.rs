use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use m3u8_rs::{MasterPlaylist, QuotedOrUnquoted, Resolution, VariantStream};
use tracing::debug;

use super::entry::ManifestEntry;
use crate::{Error, Result};

/// File name of the master manifest inside a camera output directory.
pub const MASTER_PLAYLIST_NAME: &str = "playlist.m3u";

/// Backing store for a [`Manifest`](super::Manifest).
pub trait ManifestSink: Send + Sync {
    /// Overwrite the store with `entries`, in the given order.
    fn persist(&self, entries: &[ManifestEntry]) -> Result<()>;
}

/// Writes the manifest as an HLS master playlist.
#[derive(Debug, Clone)]
pub struct PlaylistFileSink {
    path: PathBuf,
}

impl PlaylistFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Sink writing `playlist.m3u` inside `output_dir`.
    pub fn in_dir(output_dir: &Path) -> Self {
        Self::new(output_dir.join(MASTER_PLAYLIST_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(entries: &[ManifestEntry]) -> Result<Vec<u8>> {
        let playlist = MasterPlaylist {
            variants: entries.iter().map(variant_for).collect(),
            ..Default::default()
        };

        let mut buf = Vec::new();
        playlist.write_to(&mut buf)?;
        Ok(buf)
    }
}

fn variant_for(entry: &ManifestEntry) -> VariantStream {
    let mut other = HashMap::new();
    other.insert(
        "PROGRAM-ID".to_string(),
        QuotedOrUnquoted::Unquoted("1".to_string()),
    );

    VariantStream {
        uri: entry.name.clone(),
        bandwidth: entry.bandwidth,
        resolution: Some(Resolution {
            width: u64::from(entry.width),
            height: u64::from(entry.height),
        }),
        codecs: entry.codecs().map(str::to_string),
        other_attributes: Some(other),
        ..Default::default()
    }
}

impl ManifestSink for PlaylistFileSink {
    fn persist(&self, entries: &[ManifestEntry]) -> Result<()> {
        let content = Self::render(entries)?;
        let tmp = self.path.with_extension("m3u.tmp");

        let mut file = std::fs::File::create(&tmp)
            .map_err(|e| Error::io_path("creating manifest", &tmp, e))?;
        file.write_all(&content)
            .map_err(|e| Error::io_path("writing manifest", &tmp, e))?;
        file.sync_all()
            .map_err(|e| Error::io_path("syncing manifest", &tmp, e))?;
        drop(file);

        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::io_path("replacing manifest", &self.path, e))?;

        debug!(path = %self.path.display(), entries = entries.len(), "Manifest persisted");
        Ok(())
    }
}
