//! External transcoding processes.
//!
//! A [`ProcessDescriptor`] pairs a [`ProcessLauncher`] with the files the
//! launched process writes. Supervisors only ever talk to the resulting
//! [`ProcessHandle`]s.

mod descriptor;
mod ffmpeg;
mod handle;

pub use descriptor::{CommandLauncher, ProcessDescriptor, ProcessDescriptorFactory, ProcessLauncher};
pub use ffmpeg::FfmpegDescriptorFactory;
pub use handle::{ChildHandle, ProcessHandle};
pub use process_utils::ExitReport;
