//! On-disk copies of raw GraphQL pages.
//!
//! Recording saves the `data` of every successful request under a key derived
//! from the query text and variables (cursor included, so each page has its
//! own file). Replaying answers requests from those files when present and
//! falls through to the network otherwise. Either way the cache is a side
//! channel: a failure to read or write it is logged and ignored.

use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::transport::GraphqlRequest;
use crate::output::write_json_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Save every page; never answer from disk.
    Record,
    /// Answer from disk when possible, save what had to be fetched.
    Replay,
}

#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
    mode: CacheMode,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>, mode: CacheMode) -> Self {
        Self {
            dir: dir.into(),
            mode,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A stable file-name-safe key for a request.
    pub fn key(request: &GraphqlRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.query.as_bytes());
        hasher.update(b"\n");
        hasher.update(Value::Object(request.variables.clone()).to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn path_for(&self, request: &GraphqlRequest) -> PathBuf {
        self.dir.join(format!("{}.json", Self::key(request)))
    }

    /// Returns the saved `data` for this request, in replay mode.
    pub fn load(&self, request: &GraphqlRequest) -> Option<Value> {
        if self.mode != CacheMode::Replay {
            return None;
        }
        let path = self.path_for(request);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Can't read cached page");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(data) => {
                debug!(path = %path.display(), "Replaying cached page");
                Some(data)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt cached page");
                None
            }
        }
    }

    /// Saves a page's `data`.
    pub fn store(&self, request: &GraphqlRequest, data: &Value) {
        let path = self.path_for(request);
        match write_json_atomic(&path, data) {
            Ok(()) => debug!(path = %path.display(), "Saved page"),
            Err(e) => warn!(error = %e, "Can't save page"),
        }
    }
}
