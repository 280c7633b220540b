//! v001 -- Initial schema creation.
//!
//! Creates the `materials` and `messages` tables.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Materials (uploaded teaching resources)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS materials (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    title       TEXT NOT NULL,
    file_name   TEXT NOT NULL,                -- client-supplied, display only
    file_path   TEXT NOT NULL UNIQUE,         -- server-assigned storage locator
    file_size   INTEGER NOT NULL CHECK (file_size >= 0),
    file_type   TEXT NOT NULL,                -- MIME type
    uploaded_by TEXT NOT NULL,
    class       TEXT,
    subject     TEXT,
    downloads   INTEGER NOT NULL DEFAULT 0 CHECK (downloads >= 0),
    upload_date TEXT NOT NULL,                -- RFC-3339
    is_active   INTEGER NOT NULL DEFAULT 1    -- boolean 0/1
);

CREATE INDEX IF NOT EXISTS idx_materials_uploader_date
    ON materials(uploaded_by, upload_date DESC);

-- ----------------------------------------------------------------
-- Messages (mailbox entries)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id             TEXT PRIMARY KEY NOT NULL, -- UUID v4
    sender         TEXT NOT NULL,
    recipient      TEXT NOT NULL CHECK (length(trim(recipient)) > 0),
    recipient_type TEXT NOT NULL DEFAULT 'parent'
                   CHECK (recipient_type IN ('parent', 'student', 'group', 'all')),
    subject        TEXT NOT NULL CHECK (length(trim(subject)) > 0),
    body           TEXT NOT NULL CHECK (length(body) > 0),
    sent_date      TEXT NOT NULL,             -- RFC-3339
    is_read        INTEGER NOT NULL DEFAULT 0,
    read_date      TEXT
);

CREATE INDEX IF NOT EXISTS idx_messages_sender_date
    ON messages(sender, sent_date DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
