//! HTTP control surface.
//!
//! - REST endpoints under `/api/cameras`
//! - a JSON-RPC endpoint at `/rpc` for remote start/stop/list
//! - health checks under `/health`

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
