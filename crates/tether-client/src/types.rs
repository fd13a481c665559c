//! Request and response bodies exchanged with the daemon.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    pub paths: Vec<String>,
    pub force: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockFailure {
    pub path: String,
    pub reason: String,
}

impl LockFailure {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { path: path.into(), reason: reason.into() }
    }

    pub fn message(&self, action: LockAction) -> String {
        format!("Failed to {} asset {}: {}", action.verb(), self.path, self.reason)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockBatch {
    pub paths: Vec<String>,
    pub failures: Vec<LockFailure>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockResponse {
    pub batch: LockBatch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockAction {
    Lock,
    Unlock,
}

impl LockAction {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub commit_message: String,
    pub files: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertRequest {
    pub files: Vec<String>,
    pub skip_engine_check: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    pub username: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileRevision {
    pub filename: String,
    pub commit_id: String,
    pub short_commit_id: String,
    pub commit_id_number: i32,
    pub revision_number: i32,
    pub file_hash: String,
    pub description: String,
    pub user_name: String,
    pub action: String,
    pub date: String,
    pub file_size: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileHistory {
    pub revisions: Vec<FileRevision>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUploadRequest {
    pub path: String,
    pub prefix: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDownloadRequest {
    pub path: String,
    pub key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageListRequest {
    pub prefix: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_uses_camel_case() {
        let body = serde_json::to_value(SubmitRequest {
            commit_message: "fix".into(),
            files: vec!["a".into()],
        })
        .unwrap();
        assert_eq!(body["commitMessage"], "fix");
    }

    #[test]
    fn revert_uses_camel_case() {
        let body = serde_json::to_value(RevertRequest { files: vec![], skip_engine_check: true }).unwrap();
        assert_eq!(body["skipEngineCheck"], true);
    }

    #[test]
    fn lock_response_decodes_failures() {
        let json = r#"{"batch":{"paths":["a","b"],"failures":[{"path":"b","reason":"held by bob"}]}}"#;
        let response: LockResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.batch.failures.len(), 1);
        assert_eq!(
            response.batch.failures[0].message(LockAction::Lock),
            "Failed to lock asset b: held by bob"
        );
    }

    #[test]
    fn history_tolerates_missing_fields() {
        let history: FileHistory =
            serde_json::from_str(r#"{"revisions":[{"commitId":"abc","userName":"alice"}]}"#).unwrap();
        assert_eq!(history.revisions[0].commit_id, "abc");
        assert_eq!(history.revisions[0].revision_number, 0);
    }
}
