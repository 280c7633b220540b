//! Material intake.
//!
//! An upload touches two stores that share no transaction: the bytes go to
//! the [`BlobStore`] first, then the record goes to the metadata repository.
//! If the record cannot be written the bytes are deleted again, so a failed
//! upload does not leave a blob behind (unless that delete fails too, which
//! is logged as an orphan).

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use classhub_shared::constants::DEFAULT_FILE_TYPE;
use classhub_shared::UserId;
use classhub_store::Material;

use crate::blob_store::{BlobStore, PendingBlob};
use crate::error::ServerError;
use crate::repository::MetadataRepository;

/// Optional descriptive fields sent alongside the file.
#[derive(Debug, Default, Clone)]
pub struct MaterialForm {
    pub title: Option<String>,
    pub class: Option<String>,
    pub subject: Option<String>,
}

/// File bytes already in the blob store, plus what the client declared.
#[derive(Debug)]
pub struct ReceivedFile {
    pub file_name: String,
    pub file_type: String,
    pub blob: PendingBlob,
}

/// Response projection.  Never includes the storage path.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedMaterial {
    pub id: Uuid,
    pub title: String,
    pub file_name: String,
    pub file_size: i64,
    pub upload_date: DateTime<Utc>,
}

/// Read a `multipart/form-data` upload and store it.
///
/// The `file` part is streamed straight into the blob store; `title`,
/// `class` and `subject` may appear before or after it.
pub async fn receive(
    blobs: &BlobStore,
    repo: &dyn MetadataRepository,
    caller: &UserId,
    mut multipart: Multipart,
) -> Result<UploadedMaterial, ServerError> {
    let mut form = MaterialForm::default();
    let mut file: Option<ReceivedFile> = None;

    // Any early return below drops `file`, which removes its bytes.
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, blobs.max_size()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" if file.is_none() => {
                let Some(file_name) = declared_file_name(&field) else {
                    continue;
                };
                let file_type = field
                    .content_type()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(DEFAULT_FILE_TYPE)
                    .to_string();
                let blob = blobs.write(field).await?;
                file = Some(ReceivedFile {
                    file_name,
                    file_type,
                    blob,
                });
            }
            "title" | "class" | "subject" => {
                let value = text_field(field)
                    .await
                    .map_err(|e| multipart_error(e, blobs.max_size()))?;
                match name.as_str() {
                    "title" => form.title = value,
                    "class" => form.class = value,
                    _ => form.subject = value,
                }
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ServerError::Validation("No file uploaded".to_string()))?;
    commit(blobs, repo, caller, form, file).await
}

/// Record an already-stored file, deleting its bytes if that fails.
pub async fn commit(
    blobs: &BlobStore,
    repo: &dyn MetadataRepository,
    caller: &UserId,
    form: MaterialForm,
    file: ReceivedFile,
) -> Result<UploadedMaterial, ServerError> {
    let file_size = i64::try_from(file.blob.size())
        .map_err(|_| ServerError::Internal("file size overflows i64".to_string()))?;

    // Disarm before the insert. A dropped future may still land the row,
    // and the row must find its bytes; at worst this leaves an orphan.
    let file_path = file.blob.commit();

    let material = Material {
        id: Uuid::new_v4(),
        title: form.title.unwrap_or_else(|| file.file_name.clone()),
        file_name: file.file_name,
        file_path,
        file_size,
        file_type: file.file_type,
        uploaded_by: caller.clone(),
        class: form.class,
        subject: form.subject,
        downloads: 0,
        upload_date: Utc::now(),
        is_active: true,
    };

    match repo.insert_material(material.clone()).await {
        Ok(()) => {
            info!(
                id = %material.id,
                size = material.file_size,
                file_type = %material.file_type,
                uploaded_by = %material.uploaded_by,
                "Material uploaded"
            );
            Ok(UploadedMaterial {
                id: material.id,
                title: material.title,
                file_name: material.file_name,
                file_size: material.file_size,
                upload_date: material.upload_date,
            })
        }
        Err(e) => {
            error!(error = %e, path = %material.file_path, "Failed to record material, rolling back blob");
            if let Err(rollback) = blobs.delete(&material.file_path).await {
                error!(
                    error = %rollback,
                    path = %material.file_path,
                    "Rollback failed, blob is orphaned"
                );
            }
            Err(e.into())
        }
    }
}

// Browsers send an empty file name when no file was chosen; treat that as
// no file at all.
fn declared_file_name(field: &Field<'_>) -> Option<String> {
    field
        .file_name()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

async fn text_field(field: Field<'_>) -> Result<Option<String>, MultipartError> {
    let text = field.text().await?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

/// A body that trips the request limit is a 413, not a malformed form.
fn multipart_error(e: MultipartError, max: usize) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge { max }
    } else {
        ServerError::Validation(format!("Multipart error: {e}"))
    }
}
