use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedError {
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Unknown recipient type: {0}")]
    UnknownRecipientType(String),
}
