use std::sync::Arc;
use std::time::Duration;

use camsrv::domain::CameraId;
use camsrv::registry::{CameraRegistry, CommandOutcome};
use camsrv::testing::{FakeFactory, FakeInspector, FakeLauncher, test_config};
use tempfile::TempDir;

async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn registry(dir: &TempDir, ids: &[u32]) -> (CameraRegistry, Arc<FakeFactory>) {
    let config = test_config(dir.path(), ids);
    let factory = Arc::new(FakeFactory::default());
    let inspector = Arc::new(FakeInspector::default());
    let registry = CameraRegistry::new(&config, factory.clone(), inspector);
    (registry, factory)
}

#[tokio::test]
async fn start_then_stop_leaves_no_processes() {
    let dir = TempDir::new().unwrap();
    let (registry, factory) = registry(&dir, &[3]);
    let id = CameraId::new(3);
    let launcher = factory.launcher(id);

    assert_eq!(registry.start(id).unwrap().wait().await, CommandOutcome::Started);
    wait_until(|| launcher.live_count() == 1).await;

    let outcome = registry.stop(id).unwrap().wait().await;
    let CommandOutcome::Stopped { report } = outcome else {
        panic!("unexpected outcome {:?}", outcome);
    };
    assert_eq!(report.total, 1);
    assert!(report.all_graceful());
    assert_eq!(launcher.live_count(), 0);

    let CommandOutcome::Status { status } = registry.status(id).unwrap().wait().await else {
        panic!("expected status");
    };
    assert!(!status.active);

    registry.shutdown().await;
}

#[tokio::test]
async fn double_start_keeps_one_supervisor() {
    let dir = TempDir::new().unwrap();
    let (registry, factory) = registry(&dir, &[1]);
    let id = CameraId::new(1);

    let first = registry.start(id).unwrap();
    let second = registry.start(id).unwrap();
    assert_eq!(first.wait().await, CommandOutcome::Started);
    assert_eq!(second.wait().await, CommandOutcome::AlreadyRunning);

    wait_until(|| factory.launcher(id).spawn_count() == 1).await;
    assert_eq!(factory.calls(), 1);

    registry.shutdown().await;
    assert_eq!(factory.launcher(id).live_count(), 0);
}

#[tokio::test]
async fn stop_of_idle_camera_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let (registry, factory) = registry(&dir, &[2]);

    let outcome = registry.stop(CameraId::new(2)).unwrap().wait().await;
    assert_eq!(outcome, CommandOutcome::AlreadyStopped);
    assert_eq!(factory.calls(), 0);

    registry.shutdown().await;
}

#[tokio::test]
async fn crashed_process_is_replaced() {
    let dir = TempDir::new().unwrap();
    let (registry, factory) = registry(&dir, &[5]);
    let id = CameraId::new(5);
    let launcher = factory.launcher(id);

    registry.start(id).unwrap().wait().await;
    wait_until(|| launcher.live_count() == 1).await;

    launcher.crash_all();
    wait_until(|| launcher.spawn_count() == 2 && launcher.live_count() == 1).await;

    let CommandOutcome::Status { status } = registry.status(id).unwrap().wait().await else {
        panic!("expected status");
    };
    assert!(status.active);

    registry.shutdown().await;
}

#[tokio::test]
async fn stubborn_process_is_force_killed() {
    let dir = TempDir::new().unwrap();
    let (registry, factory) = registry(&dir, &[9]);
    let id = CameraId::new(9);
    let launcher = factory.set_launcher(id, FakeLauncher::new().ignoring_termination());

    registry.start(id).unwrap().wait().await;
    wait_until(|| launcher.live_count() == 1).await;

    let CommandOutcome::Stopped { report } = registry.stop(id).unwrap().wait().await else {
        panic!("expected stopped");
    };
    assert_eq!(report.forced, 1);
    assert!(!report.all_graceful());
    assert_eq!(launcher.live_count(), 0);

    registry.shutdown().await;
}

#[tokio::test]
async fn cameras_are_independent() {
    let dir = TempDir::new().unwrap();
    let (registry, factory) = registry(&dir, &[1, 2]);
    let (a, b) = (CameraId::new(1), CameraId::new(2));

    registry.start(a).unwrap().wait().await;
    registry.start(b).unwrap().wait().await;
    wait_until(|| factory.launcher(a).live_count() == 1 && factory.launcher(b).live_count() == 1)
        .await;

    registry.stop(a).unwrap().wait().await;
    assert_eq!(factory.launcher(a).live_count(), 0);
    assert_eq!(factory.launcher(b).live_count(), 1);

    registry.shutdown().await;
    assert_eq!(factory.launcher(b).live_count(), 0);
    assert!(registry.start(a).is_err());
}

#[tokio::test]
async fn dropping_registry_without_shutdown_stops_cameras() {
    let dir = TempDir::new().unwrap();
    let (registry, factory) = registry(&dir, &[1]);
    let id = CameraId::new(1);
    let launcher = factory.launcher(id);

    registry.start(id).unwrap().wait().await;
    wait_until(|| launcher.live_count() == 1).await;

    drop(registry);
    wait_until(|| launcher.live_count() == 0).await;

    launcher.crash_all();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(launcher.spawn_count(), 1);
}
