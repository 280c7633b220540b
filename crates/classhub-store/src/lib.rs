//! # classhub-store
//!
//! Metadata storage for uploaded teaching materials and mailbox messages,
//! backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for every domain model.
//! The download counter is maintained with a single-statement atomic
//! increment so concurrent callers never lose updates.

pub mod database;
pub mod materials;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
