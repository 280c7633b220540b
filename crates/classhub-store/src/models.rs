//! Domain model structs persisted in the metadata database.
//!
//! Every struct derives `Serialize` and `Deserialize`; the HTTP layer builds
//! its own projections so internal fields such as `file_path` never leave the
//! server.

use chrono::{DateTime, Utc};
use classhub_shared::{RecipientType, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Material
// ---------------------------------------------------------------------------

/// An uploaded teaching resource.  The bytes live in the blob store under
/// `file_path`; this record only exists once those bytes were written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Material {
    /// Unique material identifier.
    pub id: Uuid,
    /// Display title.  Falls back to `file_name` at upload time.
    pub title: String,
    /// Original client-supplied file name, used for the download disposition.
    pub file_name: String,
    /// Opaque storage locator assigned by the blob store.
    pub file_path: String,
    /// Stored length in bytes.
    pub file_size: i64,
    /// MIME type echoed on download.
    pub file_type: String,
    /// Caller that uploaded the material.
    pub uploaded_by: UserId,
    /// Free-text class tag.
    pub class: Option<String>,
    /// Free-text subject tag.
    pub subject: Option<String>,
    /// Number of downloads started.  Only ever incremented.
    pub downloads: i64,
    /// When the material was uploaded.
    pub upload_date: DateTime<Utc>,
    /// Soft-delete flag.  Persisted but not consulted by any read path yet.
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A mailbox entry addressed to a recipient identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique message identifier.
    pub id: Uuid,
    /// Caller that sent the message.
    pub sender: UserId,
    /// Free-text recipient: a name, group label or `all`.
    pub recipient: String,
    /// Audience kind of `recipient`.
    pub recipient_type: RecipientType,
    pub subject: String,
    pub body: String,
    /// When the message was stored.
    pub sent_date: DateTime<Utc>,
    pub is_read: bool,
    /// Set only once the message has been read.
    pub read_date: Option<DateTime<Utc>>,
}
