use std::sync::{Arc, RwLock};
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use tether_types::RepoStatus;

use crate::config::ClientConfig;
use crate::endpoint::{endpoints, file_history_path};
use crate::error::{ClientError, ClientResult};
use crate::token::NonceStore;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Method, Transport};
use crate::types::{
    FileHistory, LockFailure, LockRequest, LockResponse, RevertRequest, StorageDownloadRequest,
    StorageListRequest, StorageUploadRequest, SubmitRequest, UserInfo,
};

/// A repository status together with the moment it was fetched.
#[derive(Clone, Debug)]
pub struct StatusSnapshot {
    pub status: Arc<RepoStatus>,
    pub fetched_at: Instant,
}

impl StatusSnapshot {
    pub fn new(status: RepoStatus) -> Self {
        Self { status: Arc::new(status), fetched_at: Instant::now() }
    }
}

/// Authenticated client for the local daemon.
///
/// The cached status snapshot is swapped whole under a write lock, so
/// concurrent readers see either the old or the new snapshot, never a mix.
pub struct RemoteServiceClient {
    transport: Arc<dyn Transport>,
    nonce: NonceStore,
    status: RwLock<Option<StatusSnapshot>>,
}

impl RemoteServiceClient {
    /// Build a client talking HTTP to the configured daemon.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(
            Arc::new(transport),
            NonceStore::new(config.token_paths()),
        ))
    }

    /// Build a client over any transport. The token is read immediately.
    pub fn with_transport(transport: Arc<dyn Transport>, nonce: NonceStore) -> Self {
        nonce.refresh();
        Self {
            transport,
            nonce,
            status: RwLock::new(None),
        }
    }

    pub fn nonce(&self) -> &NonceStore {
        &self.nonce
    }

    pub fn refresh_auth_token(&self) -> bool {
        self.nonce.refresh()
    }

    // ------------------------------------------------------------------
    // Request plumbing
    // ------------------------------------------------------------------

    /// Send a request, retrying exactly once after a token refresh if the
    /// daemon answers 401.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ClientResult<ApiResponse> {
        let mut request = ApiRequest {
            method,
            path: path.to_string(),
            body,
            nonce: self.nonce.current(),
        };
        debug!(%method, path, "daemon request");

        let response = self.transport.send(&request).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        warn!(path, "daemon rejected auth token, refreshing and retrying once");
        self.nonce.refresh();
        request.nonce = self.nonce.current();
        let retried = self.transport.send(&request).await?;
        if retried.is_unauthorized() {
            return Err(ClientError::Unauthorized(path.to_string()));
        }
        Ok(retried)
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> ClientResult<ApiResponse> {
        let value = serde_json::to_value(body).map_err(|e| ClientError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        self.request(Method::Post, path, Some(value)).await
    }

    /// Any status other than 200 is fatal for the call.
    fn expect_ok(path: &str, response: ApiResponse) -> ClientResult<ApiResponse> {
        if response.is_ok() {
            Ok(response)
        } else {
            Err(ClientError::Status {
                path: path.to_string(),
                code: response.status,
                body: response.body,
            })
        }
    }

    /// Decode a 200 body, falling back to the default value: the remote call
    /// succeeded even if its reply is unusable.
    fn decode_or_default<T: DeserializeOwned + Default>(path: &str, body: &str) -> T {
        serde_json::from_str(body).unwrap_or_else(|e| {
            warn!(path, error = %e, "failed to decode daemon response");
            T::default()
        })
    }

    // ------------------------------------------------------------------
    // Repository status
    // ------------------------------------------------------------------

    /// Return the cached status, fetching it when unset or when forced.
    pub async fn get_status(&self, force_refresh: bool) -> ClientResult<StatusSnapshot> {
        if !force_refresh {
            if let Some(snapshot) = self.status_snapshot() {
                return Ok(snapshot);
            }
        }

        let response = match self.request(Method::Get, endpoints::STATUS, None).await {
            Ok(response) => response,
            Err(e) => {
                if matches!(e, ClientError::Transport { .. }) {
                    self.invalidate_status();
                }
                return Err(e);
            }
        };
        let response = Self::expect_ok(endpoints::STATUS, response)?;
        let status: RepoStatus =
            serde_json::from_str(&response.body).map_err(|e| ClientError::Decode {
                path: endpoints::STATUS.to_string(),
                message: e.to_string(),
            })?;

        let snapshot = StatusSnapshot::new(status);
        *self.status.write().expect("status lock poisoned") = Some(snapshot.clone());
        debug!(force_refresh, "repository status refreshed");
        Ok(snapshot)
    }

    /// The cached snapshot, without any I/O.
    pub fn status_snapshot(&self) -> Option<StatusSnapshot> {
        self.status.read().expect("status lock poisoned").clone()
    }

    /// Replace the cached snapshot with one pushed by the daemon.
    pub fn on_status_pushed(&self, status: RepoStatus) {
        *self.status.write().expect("status lock poisoned") = Some(StatusSnapshot::new(status));
        debug!("repository status pushed by daemon");
    }

    pub fn invalidate_status(&self) {
        *self.status.write().expect("status lock poisoned") = None;
    }

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    /// Lock a batch of repo-relative paths. Paths not named in the returned
    /// failures were locked.
    pub async fn lock_files(&self, paths: &[String], force: bool) -> ClientResult<Vec<LockFailure>> {
        self.lock_batch(endpoints::LOCK, paths, force).await
    }

    pub async fn unlock_files(&self, paths: &[String], force: bool) -> ClientResult<Vec<LockFailure>> {
        self.lock_batch(endpoints::UNLOCK, paths, force).await
    }

    async fn lock_batch(&self, path: &str, paths: &[String], force: bool) -> ClientResult<Vec<LockFailure>> {
        let request = LockRequest { paths: paths.to_vec(), force };
        let response = Self::expect_ok(path, self.post(path, &request).await?)?;
        let decoded: LockResponse = Self::decode_or_default(path, &response.body);
        info!(
            endpoint = path,
            requested = paths.len(),
            failed = decoded.batch.failures.len(),
            "lock batch finished"
        );
        Ok(decoded.batch.failures)
    }

    // ------------------------------------------------------------------
    // Changes
    // ------------------------------------------------------------------

    /// Submit `files` with `message`. A successful submit changes the
    /// working copy, so the cached status is dropped.
    pub async fn submit(&self, message: &str, files: &[String]) -> ClientResult<()> {
        let request = SubmitRequest {
            commit_message: message.to_string(),
            files: files.to_vec(),
        };
        Self::expect_ok(endpoints::SUBMIT, self.post(endpoints::SUBMIT, &request).await?)?;
        self.invalidate_status();
        Ok(())
    }

    pub async fn revert(&self, files: &[String]) -> ClientResult<()> {
        let request = RevertRequest { files: files.to_vec(), skip_engine_check: true };
        Self::expect_ok(endpoints::REVERT, self.post(endpoints::REVERT, &request).await?)?;
        self.invalidate_status();
        Ok(())
    }

    pub async fn diff(&self) -> ClientResult<Vec<String>> {
        let response = self.request(Method::Get, endpoints::DIFF, None).await?;
        let response = Self::expect_ok(endpoints::DIFF, response)?;
        Ok(Self::decode_or_default(endpoints::DIFF, &response.body))
    }

    pub async fn file_history(&self, file: &str) -> ClientResult<FileHistory> {
        let path = file_history_path(file);
        let response = Self::expect_ok(&path, self.request(Method::Get, &path, None).await?)?;
        Ok(Self::decode_or_default(&path, &response.body))
    }

    // ------------------------------------------------------------------
    // System
    // ------------------------------------------------------------------

    /// Connectivity probe.
    pub async fn check_system_status(&self) -> bool {
        match self.request(Method::Get, endpoints::SYSTEM_STATUS, None).await {
            Ok(response) if response.is_ok() => true,
            Ok(response) => {
                warn!(status = response.status, "daemon system status check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "daemon unreachable");
                false
            }
        }
    }

    pub async fn user_info(&self) -> ClientResult<UserInfo> {
        let response = self.request(Method::Get, endpoints::USER, None).await?;
        let response = Self::expect_ok(endpoints::USER, response)?;
        Ok(Self::decode_or_default(endpoints::USER, &response.body))
    }

    // ------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------

    pub async fn storage_upload(&self, path: &str, prefix: &str) -> ClientResult<()> {
        let request = StorageUploadRequest { path: path.to_string(), prefix: prefix.to_string() };
        let response = self.post(endpoints::STORAGE_UPLOAD, &request).await?;
        Self::expect_ok(endpoints::STORAGE_UPLOAD, response)?;
        Ok(())
    }

    pub async fn storage_download(&self, path: &str, key: &str) -> ClientResult<()> {
        let request = StorageDownloadRequest { path: path.to_string(), key: key.to_string() };
        let response = self.post(endpoints::STORAGE_DOWNLOAD, &request).await?;
        Self::expect_ok(endpoints::STORAGE_DOWNLOAD, response)?;
        Ok(())
    }

    pub async fn storage_list(&self, prefix: &str) -> ClientResult<Vec<String>> {
        let request = StorageListRequest { prefix: prefix.to_string() };
        let response = self.post(endpoints::STORAGE_LIST, &request).await?;
        let response = Self::expect_ok(endpoints::STORAGE_LIST, response)?;
        Ok(Self::decode_or_default(endpoints::STORAGE_LIST, &response.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDaemon;
    use tether_types::{RemoteLock, StatusFile};

    fn client(daemon: &Arc<MockDaemon>) -> RemoteServiceClient {
        RemoteServiceClient::with_transport(daemon.clone(), NonceStore::fixed("nonce"))
    }

    #[tokio::test]
    async fn retry_after_single_401_succeeds_with_one_refresh() {
        let daemon = Arc::new(MockDaemon::new("alice"));
        daemon.reject_next(1);
        let client = client(&daemon);
        let before = client.nonce().refresh_count();

        let response = client.request(Method::Get, endpoints::SYSTEM_STATUS, None).await.unwrap();
        assert!(response.is_ok());
        assert_eq!(client.nonce().refresh_count() - before, 1);
        assert_eq!(daemon.call_count("/system/status"), 2);
    }

    #[tokio::test]
    async fn second_401_fails_with_one_refresh() {
        let daemon = Arc::new(MockDaemon::new("alice"));
        daemon.reject_next(2);
        let client = client(&daemon);
        let before = client.nonce().refresh_count();

        let err = client.request(Method::Get, endpoints::SYSTEM_STATUS, None).await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized(_)));
        assert_eq!(client.nonce().refresh_count() - before, 1);
        assert_eq!(daemon.call_count("/system/status"), 2);
    }

    #[tokio::test]
    async fn refreshed_token_is_sent_on_retry() {
        let dir = tempfile::tempdir().unwrap();
        let token = dir.path().join(".nonce");
        std::fs::write(&token, "stale").unwrap();

        let daemon = Arc::new(MockDaemon::new("alice"));
        daemon.require_nonce("fresh");
        let client = RemoteServiceClient::with_transport(daemon.clone(), NonceStore::new(vec![token.clone()]));

        std::fs::write(&token, "fresh").unwrap();
        assert!(client.check_system_status().await);
        assert_eq!(daemon.nonces_seen(), vec!["stale".to_string(), "fresh".to_string()]);
    }

    #[tokio::test]
    async fn status_is_cached_until_forced() {
        let daemon = Arc::new(MockDaemon::new("alice"));
        let client = client(&daemon);

        client.get_status(false).await.unwrap();
        client.get_status(false).await.unwrap();
        assert_eq!(daemon.call_count("/repo/status"), 1);

        client.get_status(true).await.unwrap();
        assert_eq!(daemon.call_count("/repo/status"), 2);
    }

    #[tokio::test]
    async fn transport_failure_resets_status_cache() {
        let daemon = Arc::new(MockDaemon::new("alice"));
        let client = client(&daemon);
        client.get_status(false).await.unwrap();
        assert!(client.status_snapshot().is_some());

        daemon.set_offline(true);
        let err = client.get_status(true).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport { .. }));
        assert!(client.status_snapshot().is_none());
    }

    #[tokio::test]
    async fn pushed_status_replaces_cache() {
        let daemon = Arc::new(MockDaemon::new("alice"));
        let client = client(&daemon);
        let mut status = RepoStatus::new();
        status.branch = "feature".into();
        status.modified_files.push(StatusFile::new("Content/A.uasset"));

        client.on_status_pushed(status);
        let snapshot = client.get_status(false).await.unwrap();
        assert_eq!(snapshot.status.branch, "feature");
        assert_eq!(daemon.call_count("/repo/status"), 0);
    }

    #[tokio::test]
    async fn lock_reports_only_failures() {
        let daemon = Arc::new(MockDaemon::new("alice"));
        daemon.fail_lock("Content/B.uasset", "locked by bob");
        let client = client(&daemon);

        let failures = client
            .lock_files(&["Content/A.uasset".into(), "Content/B.uasset".into()], false)
            .await
            .unwrap();
        assert_eq!(failures, vec![LockFailure::new("Content/B.uasset", "locked by bob")]);
        assert_eq!(daemon.status().locks_ours, vec![RemoteLock::new("Content/A.uasset", "alice")]);
    }

    #[tokio::test]
    async fn undecodable_lock_reply_counts_as_success() {
        let daemon = Arc::new(MockDaemon::new("alice"));
        daemon.respond_with("/repo/locks/lock", 200, "not json");
        let client = client(&daemon);

        let failures = client.lock_files(&["Content/A.uasset".into()], false).await.unwrap();
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn submit_non_200_carries_body() {
        let daemon = Arc::new(MockDaemon::new("alice"));
        daemon.respond_with("/repo/gh/submit", 500, "merge queue closed");
        let client = client(&daemon);

        let err = client.submit("msg", &["a".into()]).await.unwrap_err();
        match err {
            ClientError::Status { code, body, .. } => {
                assert_eq!(code, 500);
                assert_eq!(body, "merge queue closed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn submit_drops_cached_status() {
        let daemon = Arc::new(MockDaemon::new("alice"));
        let client = client(&daemon);
        client.get_status(false).await.unwrap();

        client.submit("msg", &["Content/A.uasset".into()]).await.unwrap();
        assert!(client.status_snapshot().is_none());
        client.get_status(false).await.unwrap();
        assert_eq!(daemon.call_count("/repo/status"), 2);
    }

    #[tokio::test]
    async fn system_status_false_when_offline() {
        let daemon = Arc::new(MockDaemon::new("alice"));
        daemon.set_offline(true);
        assert!(!client(&daemon).check_system_status().await);
    }

    #[tokio::test]
    async fn user_info_and_storage() {
        let daemon = Arc::new(MockDaemon::new("alice"));
        let client = client(&daemon);

        assert_eq!(client.user_info().await.unwrap().username, "alice");
        client.storage_upload("/tmp/build.zip", "builds").await.unwrap();
        assert_eq!(client.storage_list("builds").await.unwrap(), vec!["builds/build.zip".to_string()]);
        client.storage_download("/tmp/out.zip", "builds/build.zip").await.unwrap();
        assert!(client.file_history("Content/A.uasset").await.unwrap().revisions.is_empty());
    }
}
