//! camsrv library crate.
//!
//! Supervises per-camera transcoder processes, keeps a bandwidth-ordered HLS
//! master manifest per camera and serializes start/stop commands through one
//! worker per camera. The binary wraps this in an HTTP/JSON-RPC server.

pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod process;
pub mod registry;
pub mod supervisor;

#[doc(hidden)]
pub mod testing;

pub use error::{Error, Result};
