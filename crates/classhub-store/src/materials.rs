//! Queries for [`Material`] records.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use classhub_shared::UserId;

use crate::database::{decode_timestamp, encode_timestamp, Database};
use crate::error::{Result, StoreError};
use crate::models::Material;

const MATERIAL_COLUMNS: &str = "id, title, file_name, file_path, file_size, file_type, \
     uploaded_by, class, subject, downloads, upload_date, is_active";

impl Database {
    pub fn insert_material(&self, material: &Material) -> Result<()> {
        self.conn().execute(
            "INSERT INTO materials (id, title, file_name, file_path, file_size, file_type,
                                    uploaded_by, class, subject, downloads, upload_date, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                material.id.to_string(),
                material.title,
                material.file_name,
                material.file_path,
                material.file_size,
                material.file_type,
                material.uploaded_by.as_str(),
                material.class,
                material.subject,
                material.downloads,
                encode_timestamp(&material.upload_date),
                material.is_active as i32,
            ],
        )?;
        Ok(())
    }

    pub fn get_material(&self, id: Uuid) -> Result<Material> {
        self.conn()
            .query_row(
                &format!("SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = ?1"),
                params![id.to_string()],
                row_to_material,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Materials uploaded by `uploader`, newest first.
    pub fn list_materials_by_uploader(&self, uploader: &UserId) -> Result<Vec<Material>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MATERIAL_COLUMNS}
             FROM materials
             WHERE uploaded_by = ?1
             ORDER BY upload_date DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map(params![uploader.as_str()], row_to_material)?;

        let mut materials = Vec::new();
        for row in rows {
            materials.push(row?);
        }
        Ok(materials)
    }

    /// Atomically add one to the download counter and return the new value.
    ///
    /// The read-modify-write happens inside a single SQL statement, so
    /// concurrent callers cannot lose updates.
    pub fn increment_downloads(&self, id: Uuid) -> Result<i64> {
        self.conn()
            .query_row(
                "UPDATE materials SET downloads = downloads + 1
                 WHERE id = ?1
                 RETURNING downloads",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }
}

fn row_to_material(row: &rusqlite::Row<'_>) -> rusqlite::Result<Material> {
    let id_str: String = row.get(0)?;
    let uploaded_by_str: String = row.get(6)?;
    let upload_date_str: String = row.get(10)?;
    let is_active_int: i32 = row.get(11)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let uploaded_by = UserId::parse(&uploaded_by_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Material {
        id,
        title: row.get(1)?,
        file_name: row.get(2)?,
        file_path: row.get(3)?,
        file_size: row.get(4)?,
        file_type: row.get(5)?,
        uploaded_by,
        class: row.get(7)?,
        subject: row.get(8)?,
        downloads: row.get(9)?,
        upload_date: decode_timestamp(10, &upload_date_str)?,
        is_active: is_active_int != 0,
    })
}
