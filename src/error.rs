use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::state::data::ScanJobId;
use crate::state::library::StoreError;

/// Failures raised while reconciling the filesystem against the catalog.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A file could not be read to completion (vanished, permission denied, truncated).
    #[error("could not read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Another writer claimed the path between lookup and insert.
    #[error("path {0} was indexed concurrently")]
    Conflict(PathBuf),
    #[error("scan {0} is already running")]
    AlreadyRunning(ScanJobId),
    #[error("scan was cancelled")]
    Cancelled,
    #[error("scan root {path} is not accessible: {source}")]
    RootUnavailable { path: PathBuf, source: io::Error },
    #[error("filesystem watch failed: {0}")]
    Watch(#[from] notify::Error),
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure concerns a single entry and the caller may move on.
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexError::Io { .. } | IndexError::Conflict(_))
    }
}
