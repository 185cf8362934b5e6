//! Per-camera process supervision.

mod camera_supervisor;
mod observer;
mod settings;
mod snapshot;

pub use camera_supervisor::{CameraSupervisor, ShutdownReport, SupervisorHandle, SupervisorState};
pub use observer::{Observer, ObserverFn, ObserverId, ObserverSet};
pub use settings::PollSettings;
pub use snapshot::{SlotSnapshot, SupervisorSnapshot};
