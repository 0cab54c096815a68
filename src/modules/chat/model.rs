use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_MESSAGE_LENGTH, MAX_PAGE_SIZE};
use crate::modules::chat::schema::{MessageStatus, MessageType};

fn default_message_type() -> MessageType {
    MessageType::Text
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

/// Message payload as sent by a client, over the socket or over HTTP.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct MessageDraft {
    #[validate(length(min = 1, max = MAX_MESSAGE_LENGTH, message = "Content must be 1-5000 characters"))]
    pub content: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub _type: MessageType,
    pub reply_to_id: Option<i64>,
}

impl MessageDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), _type: MessageType::Text, reply_to_id: None }
    }
}

#[derive(Debug, Clone)]
pub struct InsertMessage {
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub _type: MessageType,
    pub reply_to_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub chat_id: i64,
    pub before_id: Option<i64>,
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HistoryQuery {
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = MAX_PAGE_SIZE, message = "limit must be between 1 and 100"))]
    pub limit: i64,
    pub before_id: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChatSummaryRow {
    pub chat_id: i64,
    pub user_low_id: i64,
    pub user_high_id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_message_id: Option<i64>,
    pub last_sender_id: Option<i64>,
    pub last_content: Option<String>,
    pub last_type: Option<MessageType>,
    pub last_status: Option<MessageStatus>,
    pub last_created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastMessage {
    pub id: i64,
    pub sender_id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub _type: MessageType,
    pub status: MessageStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSummary {
    pub chat_id: i64,
    pub counterpart_id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_message: Option<LastMessage>,
    pub unread_count: i64,
}

impl ChatSummary {
    pub fn from_row(row: ChatSummaryRow, user_id: i64) -> Self {
        let counterpart_id =
            if row.user_low_id == user_id { row.user_high_id } else { row.user_low_id };

        let last_message = match (
            row.last_message_id,
            row.last_sender_id,
            row.last_content,
            row.last_type,
            row.last_status,
            row.last_created_at,
        ) {
            (Some(id), Some(sender_id), Some(content), Some(_type), Some(status), Some(created_at)) => {
                Some(LastMessage { id, sender_id, content, _type, status, created_at })
            }
            _ => None,
        };

        ChatSummary {
            chat_id: row.chat_id,
            counterpart_id,
            created_at: row.created_at,
            last_message,
            unread_count: row.unread_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMediaResponse {
    pub url: String,
    #[serde(rename = "type")]
    pub _type: MessageType,
}
