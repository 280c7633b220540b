//! # classhub-server
//!
//! HTTP server for teaching materials and the teacher mailbox.
//!
//! This binary provides:
//! - **Material upload**: multipart files are streamed to disk and recorded
//!   in SQLite; the bytes are removed again if the record cannot be written
//! - **Material download**: files are streamed back with their recorded
//!   headers while a download counter is incremented atomically
//! - **Mailbox**: validated messages are stored for a recipient
//!
//! Authentication happens upstream; the gateway passes the caller in the
//! `X-User-Id` header.

mod api;
mod blob_store;
mod caller;
mod config;
mod dispatch;
mod download;
mod error;
mod repository;
mod upload;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use classhub_shared::constants::APP_NAME;
use classhub_store::Database;

use crate::api::AppState;
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::repository::SqliteRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,classhub_server=debug")),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize storage
    // -----------------------------------------------------------------------

    // Blob store (creates directory if missing)
    let blob_store = Arc::new(
        BlobStore::new(config.storage_path.clone(), config.max_upload_size).await?,
    );

    // Metadata database (runs migrations on open)
    let db_path = config.database_path.clone();
    let database = tokio::task::spawn_blocking(move || Database::open_at(&db_path)).await??;
    let repository = Arc::new(SqliteRepository::new(database));

    let app_state = AppState {
        blob_store,
        repository,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
