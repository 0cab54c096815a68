use std::path::Path;

use crate::api::error;
use crate::constants::MAX_MEDIA_SIZE;
use crate::modules::chat::schema::MessageType;

/// Media upload rules
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_size: usize,
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_MEDIA_SIZE,
            image_extensions: ["jpg", "jpeg", "png", "webp"].map(String::from).to_vec(),
            video_extensions: ["mp4", "avi", "mov"].map(String::from).to_vec(),
        }
    }
}

impl UploadConfig {
    /// Checks the file against the rules for `media_type` and returns its
    /// lowercased extension.
    pub fn validate(
        &self,
        media_type: MessageType,
        filename: &str,
        file_size: usize,
    ) -> Result<String, error::SystemError> {
        let allowed = match media_type {
            MessageType::Image => &self.image_extensions,
            MessageType::Video => &self.video_extensions,
            MessageType::Text => {
                return Err(error::SystemError::bad_request("Text is not a media type"));
            }
        };

        if file_size == 0 {
            return Err(error::SystemError::bad_request("Uploaded file is empty"));
        }

        if file_size > self.max_file_size {
            return Err(error::SystemError::bad_request(format!(
                "File size exceeds maximum allowed size of {} bytes",
                self.max_file_size
            )));
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if !allowed.contains(&extension) {
            return Err(error::SystemError::bad_request(format!(
                "File type '.{extension}' is not allowed, expected one of: {}",
                allowed.join(", ")
            )));
        }

        Ok(extension)
    }
}

/// Object key: `chat_images|chat_videos/{sender}/{chat}/{timestamp_millis}.{ext}`
pub fn object_key(media_type: MessageType, sender_id: i64, chat_id: i64, extension: &str) -> String {
    let folder = match media_type {
        MessageType::Video => "chat_videos",
        _ => "chat_images",
    };
    let timestamp = chrono::Utc::now().timestamp_millis();
    format!("{folder}/{sender_id}/{chat_id}/{timestamp}.{extension}")
}
