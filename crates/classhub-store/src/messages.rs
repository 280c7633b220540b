//! Queries for [`Message`] records.

use rusqlite::params;
use uuid::Uuid;

use classhub_shared::{RecipientType, UserId};

use crate::database::{decode_timestamp, encode_timestamp, Database};
use crate::error::{Result, StoreError};
use crate::models::Message;

const MESSAGE_COLUMNS: &str =
    "id, sender, recipient, recipient_type, subject, body, sent_date, is_read, read_date";

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, sender, recipient, recipient_type, subject, body,
                                   sent_date, is_read, read_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                message.id.to_string(),
                message.sender.as_str(),
                message.recipient,
                message.recipient_type.as_str(),
                message.subject,
                message.body,
                encode_timestamp(&message.sent_date),
                message.is_read as i32,
                message.read_date.as_ref().map(encode_timestamp),
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Messages sent by `sender`, newest first.
    pub fn list_messages_by_sender(&self, sender: &UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE sender = ?1
             ORDER BY sent_date DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map(params![sender.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn count_messages(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let recipient_type_str: String = row.get(3)?;
    let sent_str: String = row.get(6)?;
    let is_read_int: i32 = row.get(7)?;
    let read_str: Option<String> = row.get(8)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let sender = UserId::parse(&sender_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let recipient_type: RecipientType = recipient_type_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let read_date = read_str
        .map(|raw| decode_timestamp(8, &raw))
        .transpose()?;

    Ok(Message {
        id,
        sender,
        recipient: row.get(2)?,
        recipient_type,
        subject: row.get(4)?,
        body: row.get(5)?,
        sent_date: decode_timestamp(6, &sent_str)?,
        is_read: is_read_int != 0,
        read_date,
    })
}
