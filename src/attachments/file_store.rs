//! File system access for uploaded attachments.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::StoreFuture;
use crate::core::errors::{CoachError, CoachResult};

/// Facts about a stored file needed by the retention sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// Size on disk.
    pub size_bytes: u64,
}

/// Files addressed by name under a fixed root.
pub trait FileStore: Send + Sync {
    /// Stat `filename`. Returns `None` when the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the name is invalid or the file cannot be inspected.
    fn stat(&self, filename: &str) -> StoreFuture<'_, CoachResult<Option<FileStat>>>;

    /// Delete `filename`.
    ///
    /// # Errors
    /// Returns an error if the name is invalid or deletion fails.
    fn delete(&self, filename: &str) -> StoreFuture<'_, CoachResult<()>>;
}

/// Local directory implementation of [`FileStore`].
#[derive(Clone, Debug)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Serve files from `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a bare filename to a path under the root.
    fn resolve(&self, filename: &str) -> CoachResult<PathBuf> {
        let is_bare = Path::new(filename)
            .file_name()
            .is_some_and(|name| name == filename);
        if !is_bare || filename.contains('\\') {
            return Err(CoachError::InvalidRecord(format!(
                "attachment filename is not a bare name: {filename:?}"
            )));
        }
        Ok(self.root.join(filename))
    }
}

impl FileStore for LocalFileStore {
    fn stat(&self, filename: &str) -> StoreFuture<'_, CoachResult<Option<FileStat>>> {
        let path = self.resolve(filename);
        Box::pin(async move {
            let path = path?;
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Attachment file missing");
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            };

            if !metadata.is_file() {
                return Ok(None);
            }

            Ok(Some(FileStat {
                modified: DateTime::<Utc>::from(metadata.modified()?),
                size_bytes: metadata.len(),
            }))
        })
    }

    fn delete(&self, filename: &str) -> StoreFuture<'_, CoachResult<()>> {
        let path = self.resolve(filename);
        Box::pin(async move {
            tokio::fs::remove_file(path?).await?;
            Ok(())
        })
    }
}
