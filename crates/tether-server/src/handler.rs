use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use tether_client::RemoteServiceClient;
use tether_types::RepoStatus;

use crate::translate::{FriendlyName, NameTranslator};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<RemoteServiceClient>,
    pub translator: Arc<dyn NameTranslator>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FriendlyNameRequest {
    pub file_names: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct FriendlyNameResponse {
    pub names: Vec<FriendlyName>,
}

/// The daemon pushes a fresh status. An undecodable body is logged and
/// otherwise ignored; the daemon always gets `{}` back.
pub async fn status_update_handler(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<RepoStatus>(&body) {
        Ok(status) => {
            debug!(branch = %status.branch, modified = status.modified_files.len(), "status pushed");
            state.client.on_status_pushed(status);
        }
        Err(e) => warn!(
            error = %e,
            body = %String::from_utf8_lossy(&body),
            "received status update but could not decode it"
        ),
    }
    Json(json!({}))
}

pub async fn friendly_names_handler(State(state): State<AppState>, body: Bytes) -> Json<FriendlyNameResponse> {
    let request = serde_json::from_slice::<FriendlyNameRequest>(&body).unwrap_or_else(|e| {
        warn!(error = %e, "malformed friendly name request");
        FriendlyNameRequest::default()
    });
    let names = state.translator.translate(&request.file_names);
    debug!(requested = request.file_names.len(), "translated friendly names");
    Json(FriendlyNameResponse { names })
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
