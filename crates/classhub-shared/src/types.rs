use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_USER_ID_LEN;
use crate::error::SharedError;

// Caller identity as issued by the authentication collaborator. Opaque to us.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn parse(s: &str) -> Result<Self, SharedError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SharedError::InvalidUserId("empty".to_string()));
        }
        if s.len() > MAX_USER_ID_LEN {
            return Err(SharedError::InvalidUserId(format!(
                "longer than {MAX_USER_ID_LEN} bytes"
            )));
        }
        if s.chars().any(char::is_control) {
            return Err(SharedError::InvalidUserId(
                "contains control characters".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Audience a mailbox entry is addressed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    #[default]
    Parent,
    Student,
    Group,
    All,
}

impl RecipientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Student => "student",
            Self::Group => "group",
            Self::All => "all",
        }
    }
}

impl FromStr for RecipientType {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent" => Ok(Self::Parent),
            "student" => Ok(Self::Student),
            "group" => Ok(Self::Group),
            "all" => Ok(Self::All),
            other => Err(SharedError::UnknownRecipientType(other.to_string())),
        }
    }
}

impl std::fmt::Display for RecipientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
