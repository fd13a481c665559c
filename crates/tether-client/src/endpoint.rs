/// HTTP endpoint paths served by the daemon.
pub mod endpoints {
    pub const STATUS: &str = "/repo/status?skipDllCheck=true&skipEngineUpdate=true";
    pub const DIFF: &str = "/repo/diff";
    pub const USER: &str = "/repo/gh/user";
    pub const SUBMIT: &str = "/repo/gh/submit";
    pub const REVERT: &str = "/repo/revert";
    pub const LOCK: &str = "/repo/locks/lock";
    pub const UNLOCK: &str = "/repo/locks/unlock";
    pub const FILE_HISTORY: &str = "/repo/file-history";
    pub const SYSTEM_STATUS: &str = "/system/status";
    pub const STORAGE_UPLOAD: &str = "/storage/upload";
    pub const STORAGE_DOWNLOAD: &str = "/storage/download";
    pub const STORAGE_LIST: &str = "/storage/list";
}

/// Header carrying the auth nonce.
pub const NONCE_HEADER: &str = "X-Ethos-Nonce";

/// Strip the query string from a request path.
pub fn route_of(path: &str) -> &str {
    path.split_once('?').map_or(path, |(route, _)| route)
}

/// Build the file-history path for a repo-relative file.
pub fn file_history_path(file: &str) -> String {
    format!("{}?path={}", endpoints::FILE_HISTORY, urlencoding::encode(file))
}
