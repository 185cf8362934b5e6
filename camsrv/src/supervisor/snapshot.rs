use std::path::PathBuf;

use serde::Serialize;

use crate::domain::CameraId;

/// State of one supervised slot at the end of a poll tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSnapshot {
    pub index: usize,
    pub label: String,
    pub alive: bool,
    pub pid: Option<u32>,
    /// Replacement spawns attempted for this slot since the supervisor started.
    pub restarts: u32,
    pub output_files: Vec<PathBuf>,
}

/// Context handed to observers on every poll tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorSnapshot {
    pub camera_id: CameraId,
    pub tick: u64,
    pub slots: Vec<SlotSnapshot>,
}

impl SupervisorSnapshot {
    pub fn healthy(&self) -> impl Iterator<Item = &SlotSnapshot> {
        self.slots.iter().filter(|s| s.alive)
    }

    pub fn healthy_indices(&self) -> Vec<usize> {
        self.healthy().map(|s| s.index).collect()
    }

    pub fn all_healthy(&self) -> bool {
        self.slots.iter().all(|s| s.alive)
    }
}
