//! Mailbox entries.  Messages are validated and stored; there is no
//! delivery or notification step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use classhub_shared::{RecipientType, UserId};
use classhub_store::Message;

use crate::error::ServerError;
use crate::repository::MetadataRepository;

const REQUIRED_FIELDS: &str = "Recipient, subject, and message body are required";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub recipient: Option<String>,
    pub recipient_type: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub sent_date: DateTime<Utc>,
}

pub async fn send(
    repo: &dyn MetadataRepository,
    sender: &UserId,
    request: SendMessageRequest,
) -> Result<SentMessage, ServerError> {
    let recipient = required_trimmed(request.recipient)?;
    let subject = required_trimmed(request.subject)?;
    let body = request
        .body
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| ServerError::Validation(REQUIRED_FIELDS.to_string()))?;

    let recipient_type = match request.recipient_type.as_deref().map(str::trim) {
        None | Some("") => RecipientType::default(),
        Some(raw) => raw
            .parse::<RecipientType>()
            .map_err(|e| ServerError::Validation(e.to_string()))?,
    };

    let message = Message {
        id: Uuid::new_v4(),
        sender: sender.clone(),
        recipient,
        recipient_type,
        subject,
        body,
        sent_date: Utc::now(),
        is_read: false,
        read_date: None,
    };

    repo.insert_message(message.clone()).await?;

    info!(
        id = %message.id,
        sender = %message.sender,
        recipient_type = %message.recipient_type,
        "Message stored"
    );

    Ok(SentMessage {
        id: message.id,
        recipient: message.recipient,
        subject: message.subject,
        sent_date: message.sent_date,
    })
}

fn required_trimmed(value: Option<String>) -> Result<String, ServerError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::Validation(REQUIRED_FIELDS.to_string()))
}
