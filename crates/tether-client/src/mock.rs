//! In-memory daemon for tests and offline use.
//!
//! [`MockDaemon`] implements [`Transport`] directly, so a
//! [`RemoteServiceClient`](crate::RemoteServiceClient) built over it behaves
//! as if talking to a real daemon: locks are tracked, submits clear the
//! modified list, and auth failures or outages can be scripted.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use tether_types::{RemoteLock, RepoStatus};

use crate::endpoint::route_of;
use crate::error::{ClientError, ClientResult};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};
use crate::types::{
    FileHistory, LockBatch, LockFailure, LockRequest, LockResponse, RevertRequest,
    StorageListRequest, StorageUploadRequest, SubmitRequest, UserInfo,
};

#[derive(Default)]
struct MockState {
    identity: String,
    status: RepoStatus,
    lock_failures: HashMap<String, String>,
    overrides: HashMap<String, ApiResponse>,
    reject_remaining: usize,
    required_nonce: Option<String>,
    offline: bool,
    storage: BTreeSet<String>,
    calls: Vec<(Method, String)>,
    nonces: Vec<String>,
}

/// A scriptable stand-in for the daemon.
pub struct MockDaemon {
    state: Mutex<MockState>,
}

impl MockDaemon {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MockState {
                identity: identity.into(),
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock daemon lock poisoned")
    }

    pub fn set_status(&self, status: RepoStatus) {
        self.state().status = status;
    }

    pub fn status(&self) -> RepoStatus {
        self.state().status.clone()
    }

    /// Mutate the served status in place.
    pub fn update_status(&self, f: impl FnOnce(&mut RepoStatus)) {
        f(&mut self.state().status);
    }

    /// Make every lock request for `path` fail with `reason`.
    pub fn fail_lock(&self, path: impl Into<String>, reason: impl Into<String>) {
        self.state().lock_failures.insert(path.into(), reason.into());
    }

    /// Answer the next `count` requests with 401.
    pub fn reject_next(&self, count: usize) {
        self.state().reject_remaining = count;
    }

    /// Answer 401 to any request not carrying `nonce`.
    pub fn require_nonce(&self, nonce: impl Into<String>) {
        self.state().required_nonce = Some(nonce.into());
    }

    /// Simulate the daemon being down: no response at all.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Serve a fixed response for a route, bypassing the simulation.
    pub fn respond_with(&self, route: &str, status: u16, body: impl Into<String>) {
        self.state()
            .overrides
            .insert(route.to_string(), ApiResponse::new(status, body));
    }

    /// Number of requests received for a route, query string ignored.
    pub fn call_count(&self, route: &str) -> usize {
        self.state().calls.iter().filter(|(_, path)| route_of(path) == route).count()
    }

    /// Every request path received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.iter().map(|(_, path)| path.clone()).collect()
    }

    pub fn nonces_seen(&self) -> Vec<String> {
        self.state().nonces.clone()
    }

    fn handle(state: &mut MockState, request: &ApiRequest) -> ApiResponse {
        let route = route_of(&request.path);
        match (request.method, route) {
            (Method::Get, "/repo/status") => json_response(&state.status),
            (Method::Get, "/system/status") => ApiResponse::ok("{}"),
            (Method::Get, "/repo/gh/user") => json_response(&UserInfo { username: state.identity.clone() }),
            (Method::Get, "/repo/diff") => {
                let paths: Vec<&str> = state.status.modified_files.iter().map(|f| f.path.as_str()).collect();
                json_response(&paths)
            }
            (Method::Get, "/repo/file-history") => json_response(&FileHistory::default()),
            (Method::Post, "/repo/locks/lock") => match parse::<LockRequest>(request) {
                Ok(body) => Self::lock(state, body),
                Err(response) => response,
            },
            (Method::Post, "/repo/locks/unlock") => match parse::<LockRequest>(request) {
                Ok(body) => Self::unlock(state, body),
                Err(response) => response,
            },
            (Method::Post, "/repo/gh/submit") => match parse::<SubmitRequest>(request) {
                Ok(body) => {
                    let files: BTreeSet<String> = body.files.into_iter().collect();
                    let status = &mut state.status;
                    status.modified_files.retain(|f| !files.contains(&f.path));
                    status.untracked_files.retain(|f| !files.contains(&f.path));
                    status.locks_ours.retain(|l| !files.contains(&l.path));
                    ApiResponse::ok("{}")
                }
                Err(response) => response,
            },
            (Method::Post, "/repo/revert") => match parse::<RevertRequest>(request) {
                Ok(body) => {
                    let files: BTreeSet<String> = body.files.into_iter().collect();
                    let status = &mut state.status;
                    status.modified_files.retain(|f| !files.contains(&f.path));
                    status.untracked_files.retain(|f| !files.contains(&f.path));
                    ApiResponse::ok("{}")
                }
                Err(response) => response,
            },
            (Method::Post, "/storage/upload") => match parse::<StorageUploadRequest>(request) {
                Ok(body) => {
                    let name = body.path.rsplit(['/', '\\']).next().unwrap_or_default().to_string();
                    state.storage.insert(format!("{}/{}", body.prefix, name));
                    ApiResponse::ok("{}")
                }
                Err(response) => response,
            },
            (Method::Post, "/storage/download") => ApiResponse::ok("{}"),
            (Method::Post, "/storage/list") => match parse::<StorageListRequest>(request) {
                Ok(body) => {
                    let keys: Vec<&String> =
                        state.storage.iter().filter(|k| k.starts_with(&body.prefix)).collect();
                    json_response(&keys)
                }
                Err(response) => response,
            },
            _ => ApiResponse::new(404, format!("no route for {} {}", request.method, route)),
        }
    }

    fn lock(state: &mut MockState, body: LockRequest) -> ApiResponse {
        let mut failures = Vec::new();
        for path in &body.paths {
            if let Some(reason) = state.lock_failures.get(path) {
                failures.push(LockFailure::new(path.clone(), reason.clone()));
                continue;
            }
            if !body.force {
                if let Some(theirs) = state.status.locks_theirs.iter().find(|l| &l.path == path) {
                    failures.push(LockFailure::new(path.clone(), format!("locked by {}", theirs.owner.name)));
                    continue;
                }
            }
            state.status.locks_theirs.retain(|l| &l.path != path);
            if !state.status.locks_ours.iter().any(|l| &l.path == path) {
                state.status.locks_ours.push(RemoteLock::new(path.clone(), state.identity.clone()));
            }
        }
        json_response(&LockResponse { batch: LockBatch { paths: body.paths, failures } })
    }

    fn unlock(state: &mut MockState, body: LockRequest) -> ApiResponse {
        let mut failures = Vec::new();
        for path in &body.paths {
            if let Some(reason) = state.lock_failures.get(path) {
                failures.push(LockFailure::new(path.clone(), reason.clone()));
                continue;
            }
            state.status.locks_ours.retain(|l| &l.path != path);
        }
        json_response(&LockResponse { batch: LockBatch { paths: body.paths, failures } })
    }
}

#[async_trait]
impl Transport for MockDaemon {
    async fn send(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        let mut state = self.state();
        state.calls.push((request.method, request.path.clone()));
        state.nonces.push(request.nonce.clone());

        if state.offline {
            return Err(ClientError::Transport {
                path: request.path.clone(),
                message: "connection refused".into(),
            });
        }
        if state.reject_remaining > 0 {
            state.reject_remaining -= 1;
            return Ok(ApiResponse::new(401, "denied"));
        }
        if let Some(required) = &state.required_nonce {
            if &request.nonce != required {
                return Ok(ApiResponse::new(401, "denied"));
            }
        }
        if let Some(response) = state.overrides.get(route_of(&request.path)) {
            return Ok(response.clone());
        }
        Ok(Self::handle(&mut state, request))
    }
}

fn json_response<T: serde::Serialize>(value: &T) -> ApiResponse {
    match serde_json::to_string(value) {
        Ok(body) => ApiResponse::ok(body),
        Err(e) => ApiResponse::new(500, e.to_string()),
    }
}

fn parse<T: DeserializeOwned>(request: &ApiRequest) -> Result<T, ApiResponse> {
    let body = request.body.clone().unwrap_or(serde_json::Value::Null);
    serde_json::from_value(body).map_err(|e| ApiResponse::new(400, e.to_string()))
}
