/// WebSocket Message Protocol
///
/// Client → server frames carry an `action`; server → client frames carry a
/// `type`. Problems with an inbound frame become `{"error": ...}` replies and
/// never close the connection.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::error;
use crate::modules::chat::{
    model::MessageDraft,
    schema::{MessageEntity, MessageStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTarget {
    Chat(i64),
    Receiver(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Send { target: SendTarget, draft: MessageDraft },
    Read { chat_id: i64 },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid JSON")]
    InvalidJson,
    #[error("Unknown action")]
    UnknownAction,
    #[error("Missing receiver")]
    MissingReceiver,
    #[error("Missing chat_id")]
    MissingChatId,
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Deserialize)]
struct SendPayload {
    chat_id: Option<i64>,
    receiver_id: Option<i64>,
    data: MessageDraft,
}

#[derive(Deserialize)]
struct ReadPayload {
    chat_id: i64,
}

/// Null and non-positive ids count as absent.
fn is_present(value: &Value, field: &str) -> bool {
    match value.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::Number(n)) => n.as_i64().map_or(true, |id| id > 0),
        Some(_) => true,
    }
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(|_| FrameError::InvalidJson)?;

        match value.get("action").and_then(Value::as_str) {
            Some("send") => {
                if !is_present(&value, "chat_id") && !is_present(&value, "receiver_id") {
                    return Err(FrameError::MissingReceiver);
                }
                let payload: SendPayload = serde_json::from_value(value)
                    .map_err(|e| FrameError::InvalidPayload(e.to_string()))?;

                // chat_id wins when both are given
                let positive = |id: Option<i64>| id.filter(|id| *id > 0);
                let target = match (positive(payload.chat_id), positive(payload.receiver_id)) {
                    (Some(chat_id), _) => SendTarget::Chat(chat_id),
                    (None, Some(receiver_id)) => SendTarget::Receiver(receiver_id),
                    (None, None) => return Err(FrameError::MissingReceiver),
                };

                Ok(ClientFrame::Send { target, draft: payload.data })
            }
            Some("read") => {
                if !is_present(&value, "chat_id") {
                    return Err(FrameError::MissingChatId);
                }
                let payload: ReadPayload = serde_json::from_value(value)
                    .map_err(|e| FrameError::InvalidPayload(e.to_string()))?;

                Ok(ClientFrame::Read { chat_id: payload.chat_id })
            }
            _ => Err(FrameError::UnknownAction),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Message { data: MessageEntity },
    StatusUpdate { message_id: i64, status: MessageStatus },
}

impl ServerFrame {
    pub fn to_json(&self) -> Result<String, error::SystemError> {
        Ok(serde_json::to_string(self)?)
    }
}

pub fn error_frame(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}
