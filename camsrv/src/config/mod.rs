//! Static camera configuration.
//!
//! The camera list is loaded once at startup from a TOML file. Any failure
//! to read, decode or validate it is fatal.

mod types;

pub use types::{
    AppConfig, CameraConfig, FfmpegSettings, SourceConfig, StreamConfig, SupervisorSettings,
};
