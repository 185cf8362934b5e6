//! JSON-RPC 2.0 control endpoint.
//!
//! Methods:
//! - `start(cam_id)` → `"cam_started"`
//! - `stop(cam_id)` → `"cam_stopped"`
//! - `list()` → configured camera ids
//!
//! `start` and `stop` are acknowledged as soon as the command is queued.
//! `cam_id` may be passed positionally (`[7]`) or by name (`{"cam_id": 7}`).

use axum::{Json, body::Bytes, extract::State};
use serde_json::Value;
use tracing::{debug, info};

use crate::Error;
use crate::api::models::{RpcRequest, RpcResponse};
use crate::api::server::AppState;
use crate::domain::CameraId;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const UNKNOWN_CAMERA: i64 = -32001;
pub const REGISTRY_CLOSED: i64 = -32002;

pub async fn handle(State(state): State<AppState>, body: Bytes) -> Json<RpcResponse> {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => return Json(RpcResponse::error(Value::Null, PARSE_ERROR, e.to_string())),
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => return Json(RpcResponse::error(id, INVALID_REQUEST, e.to_string())),
    };
    if request.jsonrpc != "2.0" {
        return Json(RpcResponse::error(
            request.id,
            INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        ));
    }

    info!(method = %request.method, params = ?request.params, "RPC request");
    let response = dispatch(&state, request);
    debug!(result = ?response.result, error = ?response.error, "RPC response");
    Json(response)
}

fn dispatch(state: &AppState, request: RpcRequest) -> RpcResponse {
    let RpcRequest {
        method, params, id, ..
    } = request;

    match method.as_str() {
        "start" | "stop" => {
            let Some(camera_id) = camera_param(params.as_ref()) else {
                return RpcResponse::error(id, INVALID_PARAMS, "expected params [cam_id]");
            };
            let (queued, ack) = if method == "start" {
                (state.registry.start(camera_id), "cam_started")
            } else {
                (state.registry.stop(camera_id), "cam_stopped")
            };
            match queued {
                Ok(_) => RpcResponse::result(id, Value::from(ack)),
                Err(e @ Error::UnknownCamera(_)) => {
                    RpcResponse::error(id, UNKNOWN_CAMERA, e.to_string())
                }
                Err(e) => RpcResponse::error(id, REGISTRY_CLOSED, e.to_string()),
            }
        }
        "list" => {
            let ids: Vec<Value> = state
                .registry
                .list()
                .into_iter()
                .map(|c| Value::from(c.get()))
                .collect();
            RpcResponse::result(id, Value::Array(ids))
        }
        other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
    }
}

fn camera_param(params: Option<&Value>) -> Option<CameraId> {
    let raw = match params? {
        Value::Array(items) => items.first()?,
        Value::Object(map) => map.get("cam_id")?,
        _ => return None,
    };
    let n = raw.as_u64()?;
    u32::try_from(n).ok().map(CameraId::new)
}
