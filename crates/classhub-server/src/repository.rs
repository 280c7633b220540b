//! Async seam over the metadata database.
//!
//! Handlers depend on [`MetadataRepository`] rather than on the SQLite
//! handle directly, which keeps them runnable against a fault-injecting
//! implementation in tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use classhub_shared::UserId;
use classhub_store::{Database, Material, Message, StoreError};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Database worker failed: {0}")]
    Worker(String),
}

#[async_trait]
pub trait MetadataRepository: Send + Sync {
    async fn insert_material(&self, material: Material) -> Result<(), RepositoryError>;

    async fn find_material(&self, id: Uuid) -> Result<Option<Material>, RepositoryError>;

    /// Atomically add one to `downloads` and return the new value.
    async fn increment_downloads(&self, id: Uuid) -> Result<i64, RepositoryError>;

    async fn list_materials(&self, uploader: UserId) -> Result<Vec<Material>, RepositoryError>;

    async fn insert_message(&self, message: Message) -> Result<(), RepositoryError>;

    async fn list_messages(&self, sender: UserId) -> Result<Vec<Message>, RepositoryError>;
}

/// [`MetadataRepository`] backed by the SQLite [`Database`].
///
/// The connection is synchronous, so every call runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteRepository {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            // A panic while holding the lock leaves the connection usable.
            let guard = db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&*guard)
        })
        .await
        .map_err(|e| RepositoryError::Worker(e.to_string()))?
        .map_err(RepositoryError::from)
    }
}

#[async_trait]
impl MetadataRepository for SqliteRepository {
    async fn insert_material(&self, material: Material) -> Result<(), RepositoryError> {
        self.with_db(move |db| db.insert_material(&material)).await
    }

    async fn find_material(&self, id: Uuid) -> Result<Option<Material>, RepositoryError> {
        self.with_db(move |db| match db.get_material(id) {
            Ok(material) => Ok(Some(material)),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn increment_downloads(&self, id: Uuid) -> Result<i64, RepositoryError> {
        self.with_db(move |db| db.increment_downloads(id)).await
    }

    async fn list_materials(&self, uploader: UserId) -> Result<Vec<Material>, RepositoryError> {
        self.with_db(move |db| db.list_materials_by_uploader(&uploader))
            .await
    }

    async fn insert_message(&self, message: Message) -> Result<(), RepositoryError> {
        self.with_db(move |db| db.insert_message(&message)).await
    }

    async fn list_messages(&self, sender: UserId) -> Result<Vec<Message>, RepositoryError> {
        self.with_db(move |db| db.list_messages_by_sender(&sender))
            .await
    }
}

#[cfg(test)]
impl SqliteRepository {
    /// Direct access for assertions in tests.
    pub fn database(&self) -> std::sync::MutexGuard<'_, Database> {
        self.db.lock().unwrap()
    }
}
