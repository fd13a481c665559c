use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use tracing::{debug, warn};

/// The daemon's auth nonce, read from the first readable token file.
///
/// Readers share the lock; a refresh takes it exclusively.
pub struct NonceStore {
    paths: Vec<PathBuf>,
    token: RwLock<String>,
    refreshes: AtomicUsize,
}

impl NonceStore {
    /// Create a store over the given candidate files, primary first.
    /// Nothing is read until [`NonceStore::refresh`] is called.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            token: RwLock::new(String::new()),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// A store holding a fixed token and no backing files.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            paths: Vec::new(),
            token: RwLock::new(token.into()),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Re-read the token. An unreadable token is not fatal: the token is left
    /// empty and only authenticated calls will fail.
    pub fn refresh(&self) -> bool {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let loaded = self.paths.iter().find_map(|path| match std::fs::read_to_string(path) {
            Ok(contents) => {
                debug!(path = %path.display(), "loaded auth token");
                Some(contents.trim().to_string())
            }
            Err(_) => None,
        });

        let mut token = self.token.write().expect("nonce lock poisoned");
        match loaded {
            Some(value) => {
                *token = value;
                true
            }
            None => {
                if !self.paths.is_empty() {
                    warn!(
                        paths = ?self.paths,
                        "failed to read auth token; authenticated requests will be rejected"
                    );
                    token.clear();
                }
                false
            }
        }
    }

    pub fn current(&self) -> String {
        self.token.read().expect("nonce lock poisoned").clone()
    }

    /// How many times the token has been re-read.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}
