//! Reading media playlists written by the transcoders.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{Error, Result};

/// Locate the first segment referenced by the media playlist at `playlist`.
///
/// Blank lines and `#` directives are skipped. The reference is resolved
/// against the playlist's directory. Returns `Ok(None)` while the playlist
/// does not exist yet or lists no segment.
pub async fn first_segment(playlist: &Path) -> Result<Option<PathBuf>> {
    let file = match File::open(playlist).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io_path("opening playlist", playlist, e)),
    };

    let mut lines = BufReader::new(file).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| Error::io_path("reading playlist", playlist, e))?
    {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let base = playlist.parent().unwrap_or_else(|| Path::new(""));
        return Ok(Some(base.join(line)));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_first_segment_skips_directives() {
        let dir = TempDir::new().unwrap();
        let playlist = dir.path().join("p_0.m3u");
        std::fs::write(
            &playlist,
            "#EXTM3U\n#EXT-X-VERSION:3\n\n#EXTINF:5.000000,\np_0.000.ts\np_0.001.ts\n",
        )
        .unwrap();

        let segment = first_segment(&playlist).await.unwrap();
        assert_eq!(segment, Some(dir.path().join("p_0.000.ts")));
    }

    #[tokio::test]
    async fn test_missing_playlist_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let segment = first_segment(&dir.path().join("absent.m3u")).await.unwrap();
        assert_eq!(segment, None);
    }

    #[tokio::test]
    async fn test_playlist_without_segments_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let playlist = dir.path().join("p.m3u");
        std::fs::write(&playlist, "#EXTM3U\n#EXT-X-TARGETDURATION:5\n\n").unwrap();

        assert_eq!(first_segment(&playlist).await.unwrap(), None);
    }
}
