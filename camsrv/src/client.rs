//! Remote control client for a running `camsrv serve`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use crate::api::models::{RpcRequest, RpcResponse};
use crate::domain::CameraId;
use crate::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-RPC client for the `/rpc` endpoint.
#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl RpcClient {
    /// `server` is the base URL, e.g. `http://127.0.0.1:5559`.
    pub fn new(server: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: format!("{}/rpc", server.trim_end_matches('/')),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn start(&self, id: CameraId) -> Result<String> {
        self.ack("start", id).await
    }

    pub async fn stop(&self, id: CameraId) -> Result<String> {
        self.ack("stop", id).await
    }

    pub async fn list(&self) -> Result<Vec<CameraId>> {
        let result = self.call("list", None).await?;
        serde_json::from_value(result).map_err(Error::from)
    }

    async fn ack(&self, method: &str, id: CameraId) -> Result<String> {
        let result = self.call(method, Some(json!([id.get()]))).await?;
        match result {
            Value::String(ack) => Ok(ack),
            other => Err(Error::ApiError(format!(
                "unexpected {} result: {}",
                method, other
            ))),
        }
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, params, id);

        let response: RpcResponse = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::ApiError(format!("{} request failed: {}", method, e)))?
            .json()
            .await
            .map_err(|e| Error::ApiError(format!("invalid {} response: {}", method, e)))?;

        if let Some(error) = response.error {
            return Err(Error::ApiError(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }
        response
            .result
            .ok_or_else(|| Error::ApiError(format!("{} response carries no result", method)))
    }
}
