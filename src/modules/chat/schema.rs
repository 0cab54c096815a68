use serde::{Deserialize, Serialize};
use sqlx::prelude::{FromRow, Type};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Type, Serialize, Deserialize)]
#[sqlx(type_name = "message_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
}

/// Variant order is the delivery order; Postgres compares enum labels the same way.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Type, Serialize, Deserialize)]
#[sqlx(type_name = "message_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ChatEntity {
    pub id: i64,
    pub user_low_id: i64,
    pub user_high_id: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ChatEntity {
    pub fn has_member(&self, user_id: i64) -> bool {
        self.user_low_id == user_id || self.user_high_id == user_id
    }

    pub fn counterpart(&self, user_id: i64) -> Option<i64> {
        if self.user_low_id == user_id {
            Some(self.user_high_id)
        } else if self.user_high_id == user_id {
            Some(self.user_low_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct MessageEntity {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub _type: MessageType,
    pub reply_to_id: Option<i64>,
    pub status: MessageStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub delivered_at: Option<chrono::DateTime<chrono::Utc>>,
    pub read_at: Option<chrono::DateTime<chrono::Utc>>,
}
