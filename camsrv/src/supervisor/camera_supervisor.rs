//! Health-poll and restart loop for one camera's process set.
//!
//! A [`CameraSupervisor`] is built with its descriptors and observers, then
//! [`spawn`](CameraSupervisor::spawn)ed onto the runtime. The returned
//! [`SupervisorHandle`] is the only way to stop it:
//!
//! 1. All processes are spawned and the state moves to `Running`.
//! 2. Each tick waits for the current poll interval or a stop signal,
//!    refills dead slots, notifies observers and grows the interval.
//! 3. On stop every process is asked to terminate, given a grace period,
//!    then killed if it is still running.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use super::observer::{Observer, ObserverId, ObserverSet};
use super::settings::PollSettings;
use super::snapshot::{SlotSnapshot, SupervisorSnapshot};
use crate::Error;
use crate::domain::CameraId;
use crate::process::{ProcessDescriptor, ProcessHandle};

/// Lifecycle of a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Created,
    Running,
    Stopping,
    Terminated,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SupervisorState::Created => "created",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// How the processes of a supervisor ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Number of slots at shutdown start.
    pub total: usize,
    /// Exited within the grace period after a termination request.
    pub graceful: usize,
    /// Killed after ignoring the termination request.
    pub forced: usize,
    /// Already gone when termination was requested.
    pub already_exited: usize,
}

impl ShutdownReport {
    pub fn all_graceful(&self) -> bool {
        self.forced == 0
    }
}

struct Slot {
    handle: Option<Box<dyn ProcessHandle>>,
    restarts: u32,
}

/// Supervises the processes of one camera.
pub struct CameraSupervisor {
    camera_id: CameraId,
    descriptors: Vec<ProcessDescriptor>,
    settings: PollSettings,
    observers: ObserverSet,
}

impl CameraSupervisor {
    pub fn new(
        camera_id: CameraId,
        descriptors: Vec<ProcessDescriptor>,
        settings: PollSettings,
    ) -> Self {
        Self {
            camera_id,
            descriptors,
            settings,
            observers: ObserverSet::new(),
        }
    }

    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn descriptors(&self) -> &[ProcessDescriptor] {
        &self.descriptors
    }

    pub fn attach(&self, observer: Observer) -> ObserverId {
        self.observers.attach(observer)
    }

    /// Start the poll loop as a background task.
    pub fn spawn(self) -> SupervisorHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SupervisorState::Created);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);

        let camera_id = self.camera_id;
        let observers = self.observers.clone();
        let task = tokio::spawn(self.run(cancel.clone(), state_tx, snapshot_tx));

        SupervisorHandle {
            camera_id,
            cancel: cancel.clone(),
            state: state_rx,
            snapshot: snapshot_rx,
            observers,
            task,
            _stop_on_drop: cancel.drop_guard(),
        }
    }

    async fn run(
        self,
        cancel: CancellationToken,
        state_tx: watch::Sender<SupervisorState>,
        snapshot_tx: watch::Sender<Option<SupervisorSnapshot>>,
    ) -> ShutdownReport {
        let mut slots: Vec<Slot> = self
            .descriptors
            .iter()
            .map(|_| Slot {
                handle: None,
                restarts: 0,
            })
            .collect();

        for (idx, slot) in slots.iter_mut().enumerate() {
            self.spawn_slot(idx, slot);
        }
        state_tx.send_replace(SupervisorState::Running);
        info!(
            camera_id = %self.camera_id,
            processes = slots.len(),
            "Entering control loop"
        );

        let mut timeout = self.settings.base;
        let mut tick: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(timeout) => {}
            }
            tick += 1;

            for (idx, slot) in slots.iter_mut().enumerate() {
                let alive = slot.handle.as_mut().is_some_and(|h| h.is_alive());
                if alive {
                    continue;
                }
                if slot.handle.is_some() {
                    warn!(camera_id = %self.camera_id, slot = idx, "Process died, restarting");
                } else {
                    debug!(camera_id = %self.camera_id, slot = idx, "Retrying spawn");
                }
                slot.restarts += 1;
                self.spawn_slot(idx, slot);
            }

            let snapshot = self.snapshot(&mut slots, tick);
            snapshot_tx.send_replace(Some(snapshot.clone()));
            self.observers.notify_all(&snapshot).await;

            timeout = self.settings.next_timeout(timeout);
        }

        state_tx.send_replace(SupervisorState::Stopping);
        let report = self.shutdown(&mut slots).await;
        state_tx.send_replace(SupervisorState::Terminated);

        info!(
            camera_id = %self.camera_id,
            graceful = report.graceful,
            forced = report.forced,
            already_exited = report.already_exited,
            "Stopped supervisor"
        );
        report
    }

    /// A failed spawn leaves the slot empty; the next tick retries it.
    fn spawn_slot(&self, idx: usize, slot: &mut Slot) {
        let descriptor = &self.descriptors[idx];
        match descriptor.spawn() {
            Ok(handle) => {
                debug!(
                    camera_id = %self.camera_id,
                    slot = idx,
                    process = descriptor.label(),
                    pid = ?handle.pid(),
                    "Process started"
                );
                slot.handle = Some(handle);
            }
            Err(e) => {
                error!(
                    camera_id = %self.camera_id,
                    slot = idx,
                    error = %e,
                    "Failed to start process"
                );
                slot.handle = None;
            }
        }
    }

    fn snapshot(&self, slots: &mut [Slot], tick: u64) -> SupervisorSnapshot {
        let slots = slots
            .iter_mut()
            .zip(&self.descriptors)
            .enumerate()
            .map(|(index, (slot, descriptor))| {
                let alive = slot.handle.as_mut().is_some_and(|h| h.is_alive());
                SlotSnapshot {
                    index,
                    label: descriptor.label().to_string(),
                    alive,
                    pid: slot.handle.as_ref().and_then(|h| h.pid()),
                    restarts: slot.restarts,
                    output_files: descriptor.output_files().to_vec(),
                }
            })
            .collect();

        SupervisorSnapshot {
            camera_id: self.camera_id,
            tick,
            slots,
        }
    }

    async fn shutdown(&self, slots: &mut [Slot]) -> ShutdownReport {
        let grace = self.settings.shutdown_grace;
        let mut report = ShutdownReport {
            total: slots.len(),
            ..Default::default()
        };

        let mut pending = Vec::with_capacity(slots.len());
        for (idx, slot) in slots.iter_mut().enumerate() {
            let Some(handle) = slot.handle.as_mut() else {
                report.already_exited += 1;
                continue;
            };
            match handle.request_termination() {
                Ok(true) => pending.push(idx),
                Ok(false) => {
                    debug!(camera_id = %self.camera_id, slot = idx, "Process already terminated");
                    report.already_exited += 1;
                }
                Err(e) => {
                    warn!(
                        camera_id = %self.camera_id,
                        slot = idx,
                        error = %e,
                        "Termination request failed"
                    );
                    pending.push(idx);
                }
            }
        }

        for idx in pending {
            let Some(handle) = slots[idx].handle.as_mut() else {
                continue;
            };
            debug!(camera_id = %self.camera_id, slot = idx, "Waiting for process to terminate");

            match handle.wait_exit(grace).await {
                Ok(Some(exit)) => {
                    report.graceful += 1;
                    for line in &exit.stderr_tail {
                        debug!(camera_id = %self.camera_id, slot = idx, "{}", line);
                    }
                    debug!(
                        camera_id = %self.camera_id,
                        slot = idx,
                        code = ?exit.code,
                        "Process exited"
                    );
                    continue;
                }
                Ok(None) => {
                    let err = Error::ShutdownTimeout {
                        label: self.descriptors[idx].label().to_string(),
                        grace_ms: grace.as_millis() as u64,
                    };
                    warn!(camera_id = %self.camera_id, slot = idx, "{}, killing", err);
                }
                Err(e) => {
                    warn!(
                        camera_id = %self.camera_id,
                        slot = idx,
                        error = %e,
                        "Wait failed, killing"
                    );
                }
            }

            report.forced += 1;
            if let Err(e) = handle.force_kill().await {
                error!(
                    camera_id = %self.camera_id,
                    slot = idx,
                    error = %e,
                    "Failed to kill process"
                );
            }
        }

        for slot in slots.iter_mut() {
            slot.handle = None;
        }
        report
    }
}

/// Control surface of a running [`CameraSupervisor`].
pub struct SupervisorHandle {
    camera_id: CameraId,
    cancel: CancellationToken,
    state: watch::Receiver<SupervisorState>,
    snapshot: watch::Receiver<Option<SupervisorSnapshot>>,
    observers: ObserverSet,
    task: JoinHandle<ShutdownReport>,
    /// Dropping the handle stops the loop so no poll task outlives its owner.
    _stop_on_drop: DropGuard,
}

impl SupervisorHandle {
    pub fn camera_id(&self) -> CameraId {
        self.camera_id
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Snapshot taken at the end of the most recent tick.
    pub fn latest_snapshot(&self) -> Option<SupervisorSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Whether the poll loop is still running and no stop was requested.
    pub fn is_alive(&self) -> bool {
        !self.task.is_finished() && !self.cancel.is_cancelled()
    }

    pub fn attach(&self, observer: Observer) -> ObserverId {
        self.observers.attach(observer)
    }

    pub fn detach(&self, id: ObserverId) -> bool {
        self.observers.detach(id)
    }

    /// Signal the loop to stop without waiting.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the loop and wait until every process reached a terminal state.
    pub async fn stop(self) -> ShutdownReport {
        self.cancel.cancel();
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                error!(camera_id = %self.camera_id, error = %e, "Supervisor task failed");
                ShutdownReport::default()
            }
        }
    }
}

impl fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("camera_id", &self.camera_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLauncher, fast_poll};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    fn supervisor(launchers: &[Arc<FakeLauncher>]) -> CameraSupervisor {
        let descriptors = launchers
            .iter()
            .enumerate()
            .map(|(i, l)| ProcessDescriptor::new(format!("fake{}", i), l.clone(), vec![]))
            .collect();
        CameraSupervisor::new(CameraId::new(1), descriptors, fast_poll())
    }

    async fn wait_for_tick(handle: &SupervisorHandle, after: u64) -> SupervisorSnapshot {
        for _ in 0..200 {
            if let Some(s) = handle.latest_snapshot() {
                if s.tick > after {
                    return s;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no tick after {}", after);
    }

    #[tokio::test]
    async fn test_start_spawns_every_descriptor() {
        let launchers = vec![Arc::new(FakeLauncher::new()), Arc::new(FakeLauncher::new())];
        let handle = supervisor(&launchers).spawn();

        let snapshot = wait_for_tick(&handle, 0).await;
        assert!(snapshot.all_healthy());
        assert_eq!(handle.state(), SupervisorState::Running);
        assert_eq!(launchers[0].live_count(), 1);
        assert_eq!(launchers[1].live_count(), 1);

        let report = handle.stop().await;
        assert_eq!(report.total, 2);
        assert_eq!(report.graceful, 2);
        assert_eq!(launchers[0].live_count(), 0);
        assert_eq!(launchers[1].live_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_processes() {
        let launcher = Arc::new(FakeLauncher::new());
        let handle = supervisor(std::slice::from_ref(&launcher)).spawn();
        wait_for_tick(&handle, 0).await;
        assert_eq!(launcher.live_count(), 1);

        drop(handle);
        for _ in 0..200 {
            if launcher.live_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(launcher.live_count(), 0);

        // Nothing is left to restart a crashed process.
        launcher.crash_all();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(launcher.spawn_count(), 1);
    }

    #[tokio::test]
    async fn test_dead_slot_is_replaced() {
        let launcher = Arc::new(FakeLauncher::new());
        let handle = supervisor(&[launcher.clone()]).spawn();
        let first = wait_for_tick(&handle, 0).await;

        launcher.crash_all();
        let next = wait_for_tick(&handle, first.tick).await;

        assert_eq!(next.healthy_indices(), vec![0]);
        assert_eq!(next.slots[0].restarts, 1);
        assert_eq!(launcher.spawn_count(), 2);
        assert_eq!(launcher.live_count(), 1);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_is_retried() {
        let launcher = Arc::new(FakeLauncher::new());
        launcher.fail_next_spawns(1);
        let handle = supervisor(&[launcher.clone()]).spawn();

        let snapshot = wait_for_tick(&handle, 0).await;
        assert!(snapshot.all_healthy());
        assert_eq!(launcher.live_count(), 1);

        let report = handle.stop().await;
        assert_eq!(report.graceful, 1);
    }

    #[tokio::test]
    async fn test_stubborn_process_is_killed() {
        let launcher = Arc::new(FakeLauncher::new().ignoring_termination());
        let handle = supervisor(&[launcher.clone()]).spawn();
        wait_for_tick(&handle, 0).await;

        let report = handle.stop().await;
        assert_eq!(report.forced, 1);
        assert!(!report.all_graceful());
        assert_eq!(launcher.live_count(), 0);
    }

    #[tokio::test]
    async fn test_crashed_process_at_stop_counts_as_exited() {
        let launcher = Arc::new(FakeLauncher::new());
        let handle = supervisor(&[launcher.clone()]).spawn();
        wait_for_tick(&handle, 0).await;

        launcher.crash_all();
        let report = handle.stop().await;
        assert_eq!(report.total, 1);
        assert_eq!(report.graceful + report.already_exited, 1);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let launcher = Arc::new(FakeLauncher::new());
        let handle = supervisor(&[launcher]).spawn();
        let mut states = handle.subscribe_state();

        states
            .wait_for(|s| *s == SupervisorState::Running)
            .await
            .unwrap();
        assert!(handle.is_alive());

        handle.request_stop();
        assert!(!handle.is_alive());
        states
            .wait_for(|s| *s == SupervisorState::Terminated)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_observers_receive_every_tick() {
        let launcher = Arc::new(FakeLauncher::new());
        let sup = supervisor(&[launcher]);
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let seen = ticks.clone();
        sup.attach(Observer::callback("ticks", move |s| {
            seen.lock().push(s.tick);
            Ok(())
        }));
        sup.attach(Observer::callback("broken", |_| {
            Err(Error::Other("nope".to_string()))
        }));

        let handle = sup.spawn();
        let snapshot = wait_for_tick(&handle, 2).await;
        handle.stop().await;

        let ticks = ticks.lock();
        assert!(ticks.len() as u64 >= snapshot.tick);
        assert_eq!(&ticks[..3], &[1, 2, 3]);
    }
}
