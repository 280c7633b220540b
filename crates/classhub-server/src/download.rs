//! Material delivery.
//!
//! Order of operations: look the record up, check the bytes are there, open
//! them, bump the counter, then stream.  The counter is best effort; a
//! failed increment is logged and the file is still served.  Once streaming
//! starts the increment stands, even if the client goes away mid-transfer.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use classhub_shared::constants::DEFAULT_FILE_TYPE;
use classhub_store::Material;

use crate::blob_store::{BlobStore, StorageError};
use crate::error::ServerError;
use crate::repository::MetadataRepository;

/// An opened material ready to be streamed.
#[derive(Debug)]
pub struct MaterialDownload {
    material: Material,
    file: File,
}

impl MaterialDownload {
    pub fn material(&self) -> &Material {
        &self.material
    }
}

pub async fn open(
    blobs: &BlobStore,
    repo: &dyn MetadataRepository,
    id: Uuid,
) -> Result<MaterialDownload, ServerError> {
    let mut material = repo
        .find_material(id)
        .await?
        .ok_or_else(|| ServerError::NotFound("Material not found".to_string()))?;

    if !blobs.exists(&material.file_path).await? {
        warn!(
            id = %material.id,
            path = %material.file_path,
            "Material record has no bytes in storage"
        );
        return Err(ServerError::NotFound("File not found on server".to_string()));
    }

    let file = blobs.open(&material.file_path).await.map_err(|e| match e {
        StorageError::Missing(path) => {
            warn!(id = %material.id, %path, "Material bytes vanished before open");
            ServerError::NotFound("File not found on server".to_string())
        }
        other => other.into(),
    })?;

    match repo.increment_downloads(id).await {
        Ok(downloads) => {
            debug!(id = %id, downloads, "Download counter incremented");
            material.downloads = downloads;
        }
        Err(e) => warn!(id = %id, error = %e, "Failed to increment download counter"),
    }

    Ok(MaterialDownload { material, file })
}

impl IntoResponse for MaterialDownload {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, content_type(&self.material));
        headers.insert(
            header::CONTENT_DISPOSITION,
            content_disposition(&self.material.file_name),
        );
        headers.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from(u64::try_from(self.material.file_size).unwrap_or(0)),
        );

        // Dropping the body (client disconnect) drops the reader and closes
        // the file.
        let body = Body::from_stream(ReaderStream::new(self.file));
        (StatusCode::OK, headers, body).into_response()
    }
}

fn content_type(material: &Material) -> HeaderValue {
    HeaderValue::from_str(&material.file_type).unwrap_or_else(|_| {
        warn!(
            id = %material.id,
            file_type = %material.file_type,
            "Stored MIME type is not a valid header value"
        );
        HeaderValue::from_static(DEFAULT_FILE_TYPE)
    })
}

/// `attachment; filename="<name>"` with the name made safe for a quoted
/// string: quotes and backslashes are escaped, control characters dropped.
fn content_disposition(file_name: &str) -> HeaderValue {
    let mut escaped = String::with_capacity(file_name.len());
    for c in file_name.chars() {
        match c {
            '"' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            c if c.is_control() => {}
            c => escaped.push(c),
        }
    }
    HeaderValue::from_str(&format!("attachment; filename=\"{escaped}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
