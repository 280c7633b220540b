//! Fixtures shared by the handler tests.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use classhub_shared::UserId;
use classhub_store::{Database, Material, Message};

use crate::blob_store::BlobStore;
use crate::repository::{MetadataRepository, RepositoryError, SqliteRepository};

pub const TEST_MAX_UPLOAD: usize = 64 * 1024;

pub struct TestContext {
    pub blobs: Arc<BlobStore>,
    pub repo: SqliteRepository,
    pub caller: UserId,
    _dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let blobs = BlobStore::new(dir.path().join("blobs"), TEST_MAX_UPLOAD)
            .await
            .unwrap();
        let db = Database::open_at(&dir.path().join("meta.db")).unwrap();
        Self {
            blobs: Arc::new(blobs),
            repo: SqliteRepository::new(db),
            caller: UserId::parse("teacher-1").unwrap(),
            _dir: dir,
        }
    }
}

pub fn blob_count(blobs: &BlobStore) -> usize {
    std::fs::read_dir(blobs.base_path()).unwrap().count()
}

/// Delegates to SQLite but fails selected writes.
pub struct FailingRepository {
    inner: SqliteRepository,
    fail_inserts: bool,
    fail_increments: bool,
}

impl FailingRepository {
    /// Every material/message insert fails.
    pub fn new(inner: SqliteRepository) -> Self {
        Self {
            inner,
            fail_inserts: true,
            fail_increments: false,
        }
    }

    /// Only the download counter fails.
    pub fn with_failing_increments(inner: SqliteRepository) -> Self {
        Self {
            inner,
            fail_inserts: false,
            fail_increments: true,
        }
    }

    fn injected() -> RepositoryError {
        RepositoryError::Worker("injected failure".to_string())
    }
}

#[async_trait]
impl MetadataRepository for FailingRepository {
    async fn insert_material(&self, material: Material) -> Result<(), RepositoryError> {
        if self.fail_inserts {
            return Err(Self::injected());
        }
        self.inner.insert_material(material).await
    }

    async fn find_material(&self, id: Uuid) -> Result<Option<Material>, RepositoryError> {
        self.inner.find_material(id).await
    }

    async fn increment_downloads(&self, id: Uuid) -> Result<i64, RepositoryError> {
        if self.fail_increments {
            return Err(Self::injected());
        }
        self.inner.increment_downloads(id).await
    }

    async fn list_materials(&self, uploader: UserId) -> Result<Vec<Material>, RepositoryError> {
        self.inner.list_materials(uploader).await
    }

    async fn insert_message(&self, message: Message) -> Result<(), RepositoryError> {
        if self.fail_inserts {
            return Err(Self::injected());
        }
        self.inner.insert_message(message).await
    }

    async fn list_messages(&self, sender: UserId) -> Result<Vec<Message>, RepositoryError> {
        self.inner.list_messages(sender).await
    }
}
