//! Serialized per-camera lifecycle commands.

mod command;
#[allow(clippy::module_inception)]
mod registry;
mod worker;

pub use command::{CameraStatus, CommandKind, CommandOutcome, CommandTicket};
pub use registry::CameraRegistry;
