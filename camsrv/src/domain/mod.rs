//! Domain value objects shared across modules.

mod camera_id;

pub use camera_id::CameraId;
