use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use camsrv::domain::CameraId;
use camsrv::manifest::MASTER_PLAYLIST_NAME;
use camsrv::process::FfmpegDescriptorFactory;
use camsrv::registry::{CameraRegistry, CommandOutcome};
use camsrv::testing::{FakeFactory, FakeInspector, test_config, write_media_playlist};
use tempfile::TempDir;

fn stream_infs(manifest: &Path) -> Vec<String> {
    std::fs::read_to_string(manifest)
        .unwrap_or_default()
        .lines()
        .filter(|l| l.starts_with("#EXT-X-STREAM-INF"))
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn manifest_follows_transcoder_output() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &[7]);
    let factory = Arc::new(FakeFactory::default());
    let inspector = Arc::new(FakeInspector::default());
    let registry = CameraRegistry::new(&config, factory.clone(), inspector.clone());
    let id = CameraId::new(7);

    let output_dir = dir.path().join("7");
    let manifest = output_dir.join(MASTER_PLAYLIST_NAME);
    let playlists: Vec<_> = (0..2)
        .map(|i| FfmpegDescriptorFactory::playlist_path(&output_dir, "rtsp://camera-7/stream", i))
        .collect();

    assert_eq!(registry.start(id).unwrap().wait().await, CommandOutcome::Started);
    assert!(output_dir.is_dir());

    // Pretend the transcoder produced both renditions, higher bandwidth first.
    write_media_playlist(&playlists[1], 1_200_000, 640, 480).unwrap();
    write_media_playlist(&playlists[0], 500_000, 320, 240).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while stream_infs(&manifest).len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("manifest never listed both streams");

    let infs = stream_infs(&manifest);
    assert!(infs[0].contains("BANDWIDTH=500000"));
    assert!(infs[0].contains("RESOLUTION=320x240"));
    assert!(infs[1].contains("BANDWIDTH=1200000"));

    let content = std::fs::read_to_string(&manifest).unwrap();
    let first_name = playlists[0].file_name().unwrap().to_string_lossy().to_string();
    let second_name = playlists[1].file_name().unwrap().to_string_lossy().to_string();
    let first_pos = content.find(&first_name).unwrap();
    let second_pos = content.find(&second_name).unwrap();
    assert!(first_pos < second_pos);

    let CommandOutcome::Status { status } = registry.status(id).unwrap().wait().await else {
        panic!("expected status");
    };
    assert_eq!(status.manifest.len(), 2);

    assert!(matches!(
        registry.stop(id).unwrap().wait().await,
        CommandOutcome::Stopped { .. }
    ));
    assert_eq!(factory.launcher(id).live_count(), 0);

    // A restart begins from an empty directory.
    assert_eq!(registry.start(id).unwrap().wait().await, CommandOutcome::Started);
    assert!(!playlists[0].exists());
    assert!(!playlists[1].exists());
    assert!(stream_infs(&manifest).is_empty());

    registry.shutdown().await;
}
