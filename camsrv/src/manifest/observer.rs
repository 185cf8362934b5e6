use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::entry::ManifestEntry;
use super::inspector::MediaInspector;
use super::reader::first_segment;
use super::sink::{ManifestSink, PlaylistFileSink};
use super::store::{Manifest, Upsert};
use crate::supervisor::SupervisorSnapshot;
use crate::{Error, Result};

/// Keeps a camera's master manifest in line with the media playlists its
/// healthy processes write.
///
/// Each notification re-reads every declared playlist of the healthy slots.
/// Playlists that are missing or still empty are skipped until a later tick.
pub struct ManifestObserver {
    output_dir: PathBuf,
    manifest: Mutex<Manifest>,
    inspector: Arc<dyn MediaInspector>,
}

impl ManifestObserver {
    /// Observer persisting to `playlist.m3u` inside `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, inspector: Arc<dyn MediaInspector>) -> Self {
        let output_dir = output_dir.into();
        let sink = Arc::new(PlaylistFileSink::in_dir(&output_dir));
        Self::with_sink(output_dir, sink, inspector)
    }

    pub fn with_sink(
        output_dir: impl Into<PathBuf>,
        sink: Arc<dyn ManifestSink>,
        inspector: Arc<dyn MediaInspector>,
    ) -> Self {
        let output_dir = output_dir.into();
        info!(dir = %output_dir.display(), "Created manifest observer");
        Self {
            output_dir,
            manifest: Mutex::new(Manifest::new(sink)),
            inspector,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Current entries in manifest order.
    pub fn entries(&self) -> Vec<ManifestEntry> {
        self.manifest.lock().entries().to_vec()
    }

    /// Process one supervisor tick.
    ///
    /// Files are handled independently; the error, if any, only reports how
    /// many of them failed this round.
    pub async fn on_tick(&self, snapshot: &SupervisorSnapshot) -> Result<()> {
        let files: Vec<&PathBuf> = snapshot
            .healthy()
            .flat_map(|slot| slot.output_files.iter())
            .collect();

        let mut failed = 0usize;
        for file in files {
            if let Err(e) = self.update_file(file).await {
                debug!(path = %file.display(), error = %e, "Skipping playlist this round");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(Error::observer(
                "manifest",
                format!("{} playlist(s) could not be processed", failed),
            ));
        }
        Ok(())
    }

    /// Fold one media playlist into the manifest.
    pub async fn update_file(&self, playlist: &Path) -> Result<Option<Upsert>> {
        let Some(segment) = first_segment(playlist).await? else {
            return Ok(None);
        };
        let Some(name) = playlist.file_name().map(|n| n.to_string_lossy().to_string()) else {
            return Ok(None);
        };

        let info = self.inspector.inspect(&segment).await?;
        let entry = ManifestEntry::from_media(name, info);

        let outcome = self.manifest.lock().upsert(entry)?;
        if outcome != Upsert::Unchanged {
            debug!(path = %playlist.display(), ?outcome, "Manifest updated");
        }
        Ok(Some(outcome))
    }
}

impl std::fmt::Debug for ManifestObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestObserver")
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CameraId;
    use crate::supervisor::SlotSnapshot;
    use crate::testing::{CountingSink, FakeInspector, write_media_playlist};
    use tempfile::TempDir;

    fn snapshot(files: Vec<PathBuf>, alive: bool) -> SupervisorSnapshot {
        SupervisorSnapshot {
            camera_id: CameraId::new(7),
            tick: 1,
            slots: vec![SlotSnapshot {
                index: 0,
                label: "fake".to_string(),
                alive,
                pid: Some(1),
                restarts: 0,
                output_files: files,
            }],
        }
    }

    fn observer(dir: &Path) -> (ManifestObserver, Arc<CountingSink>, Arc<FakeInspector>) {
        let sink = Arc::new(CountingSink::default());
        let inspector = Arc::new(FakeInspector::default());
        let observer = ManifestObserver::with_sink(dir, sink.clone(), inspector.clone());
        (observer, sink, inspector)
    }

    #[tokio::test]
    async fn test_unchanged_files_persist_once() {
        let dir = TempDir::new().unwrap();
        let (observer, sink, _) = observer(dir.path());
        let playlist = dir.path().join("p_0.m3u");
        write_media_playlist(&playlist, 500_000, 320, 240).unwrap();

        let snap = snapshot(vec![playlist.clone()], true);
        observer.on_tick(&snap).await.unwrap();
        observer.on_tick(&snap).await.unwrap();

        assert_eq!(sink.persist_count(), 1);
        assert_eq!(observer.entries().len(), 1);
        assert_eq!(observer.entries()[0].name, "p_0.m3u");
    }

    #[tokio::test]
    async fn test_bandwidth_change_replaces_once_and_reorders() {
        let dir = TempDir::new().unwrap();
        let (observer, sink, _) = observer(dir.path());
        let a = dir.path().join("a.m3u");
        let b = dir.path().join("b.m3u");
        write_media_playlist(&a, 500_000, 320, 240).unwrap();
        write_media_playlist(&b, 1_200_000, 640, 480).unwrap();

        let snap = snapshot(vec![a.clone(), b.clone()], true);
        observer.on_tick(&snap).await.unwrap();
        assert_eq!(sink.persist_count(), 2);

        write_media_playlist(&a, 2_000_000, 320, 240).unwrap();
        observer.on_tick(&snap).await.unwrap();

        assert_eq!(sink.persist_count(), 3);
        let names: Vec<String> = observer.entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["b.m3u", "a.m3u"]);
    }

    #[tokio::test]
    async fn test_missing_playlists_are_skipped() {
        let dir = TempDir::new().unwrap();
        let (observer, sink, inspector) = observer(dir.path());

        let snap = snapshot(vec![dir.path().join("absent.m3u")], true);
        observer.on_tick(&snap).await.unwrap();

        assert_eq!(sink.persist_count(), 0);
        assert_eq!(inspector.calls(), 0);
    }

    #[tokio::test]
    async fn test_unhealthy_slots_are_ignored() {
        let dir = TempDir::new().unwrap();
        let (observer, sink, _) = observer(dir.path());
        let playlist = dir.path().join("p.m3u");
        write_media_playlist(&playlist, 500_000, 320, 240).unwrap();

        observer
            .on_tick(&snapshot(vec![playlist], false))
            .await
            .unwrap();
        assert_eq!(sink.persist_count(), 0);
    }

    #[tokio::test]
    async fn test_inspection_failure_is_isolated_per_file() {
        let dir = TempDir::new().unwrap();
        let (observer, sink, _) = observer(dir.path());
        let good = dir.path().join("good.m3u");
        let bad = dir.path().join("bad.m3u");
        write_media_playlist(&good, 500_000, 320, 240).unwrap();
        std::fs::write(&bad, "#EXTM3U\nbad.000.ts\n").unwrap();
        std::fs::write(dir.path().join("bad.000.ts"), "garbage").unwrap();

        let err = observer
            .on_tick(&snapshot(vec![bad, good], true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Observer { .. }));
        assert_eq!(sink.persist_count(), 1);
        assert_eq!(observer.entries()[0].name, "good.m3u");
    }
}
