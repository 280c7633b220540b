//! # classhub-shared
//!
//! Identifiers, enums and constants shared between the metadata store and
//! the HTTP server.

pub mod constants;
pub mod error;
pub mod types;

pub use error::SharedError;
pub use types::{RecipientType, UserId};
