//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::CameraId;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown camera: {0}")]
    UnknownCamera(CameraId),

    #[error("Failed to spawn {label}: {source}")]
    ProcessSpawn {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Inspection of {path} failed: {reason}")]
    Inspection { path: PathBuf, reason: String },

    #[error("Process {label} ignored termination for {grace_ms} ms")]
    ShutdownTimeout { label: String, grace_ms: u64 },

    #[error("Observer {name} failed: {reason}")]
    Observer { name: String, reason: String },

    #[error("Camera registry is closed")]
    RegistryClosed,

    #[error("IO error while {op} {path}: {source}")]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn inspection(path: &Path, reason: impl Into<String>) -> Self {
        Self::Inspection {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn observer(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Observer {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error only concerns a single file or process and can be
    /// retried on the next poll tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::ProcessSpawn { .. }
                | Error::Inspection { .. }
                | Error::Observer { .. }
                | Error::IoPath { .. }
                | Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownCamera(CameraId::new(42));
        assert_eq!(err.to_string(), "Unknown camera: 42");

        let err = Error::config("no cameras declared");
        assert_eq!(err.to_string(), "Configuration error: no cameras declared");
    }

    #[test]
    fn test_io_path_context() {
        let err = Error::io_path(
            "removing output directory",
            Path::new("/tmp/hls/7"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        let msg = err.to_string();
        assert!(msg.contains("removing output directory"));
        assert!(msg.contains("/tmp/hls/7"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::inspection(Path::new("a.m3u"), "bad container").is_transient());
        assert!(Error::observer("manifest", "boom").is_transient());
        assert!(!Error::config("bad").is_transient());
        assert!(!Error::UnknownCamera(CameraId::new(1)).is_transient());
        assert!(!Error::RegistryClosed.is_transient());
    }
}
