//! Disk-backed byte store for uploaded materials.
//!
//! Every write lands in a fresh file named by a random UUID, so paths are
//! unique per call and never derived from client input.  Callers treat the
//! returned path as an opaque locator.

use std::fmt::Display;
use std::path::PathBuf;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    Missing(String),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Blob exceeds {max} bytes")]
    TooLarge { max: usize },

    #[error("Failed to read upload body: {0}")]
    Body(String),

    #[error("Failed to {op} blob {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct BlobStore {
    base_path: PathBuf,
    max_size: usize,
}

impl BlobStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)
            .await
            .map_err(|source| StorageError::Io {
                op: "create directory for",
                path: base_path.display().to_string(),
                source,
            })?;

        info!(path = %base_path.display(), max_size, "Blob store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    #[cfg(test)]
    pub fn base_path(&self) -> &std::path::Path {
        &self.base_path
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Stream `body` into a new blob.
    ///
    /// The returned [`PendingBlob`] removes the bytes again when dropped
    /// unless it is committed, so an abandoned upload leaves nothing behind.
    pub async fn write<S, E>(&self, body: S) -> Result<PendingBlob, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let id = Uuid::new_v4().to_string();
        let full_path = self.base_path.join(&id);

        // create_new: never clobber an existing blob, even on a UUID collision.
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await
            .map_err(|source| StorageError::Io {
                op: "create",
                path: id.clone(),
                source,
            })?;

        let mut pending = PendingBlob {
            path: id,
            full_path,
            size: 0,
            armed: true,
        };

        let copied = self.copy_body(&mut file, body, &pending.path).await;
        drop(file);
        pending.size = match copied {
            Ok(size) => size,
            Err(e) => {
                if let Err(cleanup) = pending.discard(self).await {
                    warn!(error = %cleanup, "Failed to remove partial blob");
                }
                return Err(e);
            }
        };

        debug!(path = %pending.path, size = pending.size, "Stored blob");
        Ok(pending)
    }

    async fn copy_body<S, E>(&self, file: &mut File, body: S, path: &str) -> Result<u64, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let io_err = |op: &'static str| {
            let path = path.to_string();
            move |source: std::io::Error| StorageError::Io { op, path, source }
        };

        let mut body = std::pin::pin!(body);
        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StorageError::Body(e.to_string()))?;
            written += chunk.len() as u64;
            if written > self.max_size as u64 {
                return Err(StorageError::TooLarge { max: self.max_size });
            }
            file.write_all(&chunk).await.map_err(io_err("write"))?;
        }
        file.flush().await.map_err(io_err("flush"))?;
        file.sync_all().await.map_err(io_err("sync"))?;
        Ok(written)
    }

    /// Open a blob for streaming.
    pub async fn open(&self, path: &str) -> Result<File, StorageError> {
        let full_path = self.resolve(path)?;
        File::open(&full_path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StorageError::Missing(path.to_string())
            } else {
                StorageError::Io {
                    op: "open",
                    path: path.to_string(),
                    source,
                }
            }
        })
    }

    pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let Ok(full_path) = self.resolve(path) else {
            return Ok(false);
        };
        fs::try_exists(&full_path)
            .await
            .map_err(|source| StorageError::Io {
                op: "stat",
                path: path.to_string(),
                source,
            })
    }

    /// Remove a blob.  Deleting a missing blob succeeds.
    pub async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full_path = self.resolve(path)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => {
                debug!(path, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                op: "delete",
                path: path.to_string(),
                source,
            }),
        }
    }

    /// Map an opaque locator back to a file under the base directory.
    /// Anything that is not a server-assigned UUID is rejected, which also
    /// rules out path traversal.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let id = Uuid::parse_str(path).map_err(|_| StorageError::InvalidPath(path.to_string()))?;
        Ok(self.base_path.join(id.to_string()))
    }
}

/// Bytes that have been written but not yet claimed by a metadata record.
#[must_use = "a pending blob is deleted when dropped"]
#[derive(Debug)]
pub struct PendingBlob {
    path: String,
    full_path: PathBuf,
    size: u64,
    armed: bool,
}

impl PendingBlob {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Keep the bytes; the caller has recorded them.
    pub fn commit(mut self) -> String {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Remove the bytes now rather than on drop.
    pub async fn discard(mut self, store: &BlobStore) -> Result<(), StorageError> {
        self.armed = false;
        store.delete(&self.path).await
    }
}

impl Drop for PendingBlob {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        let full_path = std::mem::take(&mut self.full_path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let _ = handle.spawn_blocking(move || remove_abandoned(&path, &full_path));
            }
            Err(_) => remove_abandoned(&path, &full_path),
        }
    }
}

fn remove_abandoned(path: &str, full_path: &std::path::Path) {
    match std::fs::remove_file(full_path) {
        Ok(()) => debug!(path, "Removed abandoned blob"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path, error = %e, "Failed to remove abandoned blob"),
    }
}
