//! Writing JSON artifacts without ever leaving half a file behind.
//!
//! Files are written atomically using a write-to-temp-then-rename pattern:
//! 1. Write to `<name>.tmp` beside the target
//! 2. fsync the file
//! 3. Rename over the target
//! 4. fsync the directory
//!
//! Readers (and an interrupted run) see either the old file or the new one.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::digest::DigestPayload;

/// Errors that can occur while writing an artifact.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("can't write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't serialize {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Serializes `value` as pretty JSON and writes it to `path` atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OutputError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| OutputError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_bytes_atomic(path, &bytes).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a finished digest for the rendering stage.
pub fn write_payload(path: &Path, payload: &DigestPayload) -> Result<(), OutputError> {
    write_json_atomic(path, payload)
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    // The rename is only durable once the directory entry is.
    File::open(parent)?.sync_all()
}
