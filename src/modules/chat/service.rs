use std::sync::Arc;
use validator::Validate;

use crate::{
    api::error,
    constants::MAX_PAGE_SIZE,
    modules::{
        chat::{
            model::{ChatSummary, InsertMessage, MessageDraft, MessageQuery, UploadMediaResponse},
            repository::ChatRepository,
            repository_pg::ChatRepositoryPg,
            schema::{ChatEntity, MessageEntity, MessageStatus, MessageType},
        },
        friend::service::FriendshipGate,
        media::{model::object_key, BlobStore, UploadConfig},
        websocket::{manager::ConnectionManager, message::ServerFrame, presence::PresenceRegistry},
    },
    utils::CanonicalPair,
};

/// Production service over Postgres
pub type ChatSvc = ChatService<ChatRepositoryPg>;

pub struct ChatService<S>
where
    S: ChatRepository,
{
    store: Arc<S>,
    gate: Arc<FriendshipGate>,
    connections: ConnectionManager,
    presence: Arc<dyn PresenceRegistry>,
    blobs: Arc<dyn BlobStore>,
    upload: UploadConfig,
}

impl<S> ChatService<S>
where
    S: ChatRepository,
{
    pub fn with_dependencies(
        store: Arc<S>,
        gate: Arc<FriendshipGate>,
        connections: ConnectionManager,
        presence: Arc<dyn PresenceRegistry>,
        blobs: Arc<dyn BlobStore>,
        upload: UploadConfig,
    ) -> Self {
        ChatService { store, gate, connections, presence, blobs, upload }
    }

    /// Loads the chat and checks that `user_id` is one of its two members.
    async fn member_chat(
        &self,
        chat_id: i64,
        user_id: i64,
        tx: &mut S::Tx,
    ) -> Result<ChatEntity, error::SystemError> {
        let chat = self
            .store
            .find_chat_by_id(chat_id, tx)
            .await?
            .ok_or_else(|| error::SystemError::not_found("Chat not found"))?;

        if !chat.has_member(user_id) {
            return Err(error::SystemError::forbidden("You are not a member of this chat"));
        }

        Ok(chat)
    }

    async fn resolve_chat(
        &self,
        pair: &CanonicalPair,
        tx: &mut S::Tx,
    ) -> Result<ChatEntity, error::SystemError> {
        if let Some(chat) = self.store.find_chat_by_pair(pair, tx).await? {
            return Ok(chat);
        }

        if let Some(chat) = self.store.insert_chat_if_absent(pair, tx).await? {
            tracing::info!("Created chat {} for users {} and {}", chat.id, pair.low, pair.high);
            return Ok(chat);
        }

        // lost the insert race; the winner's row is committed by now
        self.store.find_chat_by_pair(pair, tx).await?.ok_or_else(|| {
            error::SystemError::InternalError(
                format!("chat for pair {}:{} missing after conflict", pair.low, pair.high).into(),
            )
        })
    }

    pub async fn get_or_create_chat(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<ChatEntity, error::SystemError> {
        let pair = CanonicalPair::new(user_a, user_b)?;
        self.gate.require_linked(user_a, user_b).await?;

        let mut tx = self.store.begin().await?;
        let chat = self.resolve_chat(&pair, &mut tx).await?;
        self.store.commit(tx).await?;

        Ok(chat)
    }

    /// The other member of the chat, as seen by `user_id`.
    pub async fn counterpart(&self, chat_id: i64, user_id: i64) -> Result<i64, error::SystemError> {
        let mut tx = self.store.begin().await?;
        let chat = self.member_chat(chat_id, user_id, &mut tx).await?;
        self.store.commit(tx).await?;

        chat.counterpart(user_id)
            .ok_or_else(|| error::SystemError::forbidden("You are not a member of this chat"))
    }

    /// Persists the message as `sent`, pushes it to the receiver and, when the
    /// receiver is reachable, upgrades it to `delivered`. With `echo_to_sender`
    /// the sender's own connection gets the message frame as well.
    pub async fn send_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        draft: MessageDraft,
        echo_to_sender: bool,
    ) -> Result<MessageEntity, error::SystemError> {
        draft.validate()?;
        let pair = CanonicalPair::new(sender_id, receiver_id)?;
        self.gate.require_linked(sender_id, receiver_id).await?;

        let mut tx = self.store.begin().await?;
        let chat = self.resolve_chat(&pair, &mut tx).await?;

        if let Some(reply_to_id) = draft.reply_to_id {
            if self.store.find_message_in_chat(chat.id, reply_to_id, &mut tx).await?.is_none() {
                return Err(error::SystemError::bad_request(
                    "reply_to_id must reference a message in this chat",
                ));
            }
        }

        let insert = InsertMessage {
            chat_id: chat.id,
            sender_id,
            content: draft.content,
            _type: draft._type,
            reply_to_id: draft.reply_to_id,
        };
        let message = self.store.insert_message(&insert, &mut tx).await?;
        self.store.commit(tx).await?;

        tracing::debug!("Message {} stored in chat {}", message.id, chat.id);

        let frame = ServerFrame::Message { data: message.clone() };
        let delivered_locally = self.connections.deliver(receiver_id, &frame).await;
        if echo_to_sender {
            self.connections.deliver(sender_id, &frame).await;
        }

        let receiver_online = delivered_locally
            || match self.presence.is_online(receiver_id).await {
                Ok(online) => online,
                Err(e) => {
                    tracing::warn!("Skipping delivered upgrade for message {}: {e}", message.id);
                    false
                }
            };

        if !receiver_online {
            return Ok(message);
        }

        match self.upgrade_to_delivered(message.id).await {
            Ok(Some(delivered)) => {
                let status = ServerFrame::StatusUpdate {
                    message_id: delivered.id,
                    status: MessageStatus::Delivered,
                };
                self.connections.deliver(sender_id, &status).await;
                Ok(delivered)
            }
            Ok(None) => Ok(message),
            Err(e) => {
                tracing::warn!("Delivered upgrade failed for message {}: {e}", message.id);
                Ok(message)
            }
        }
    }

    /// Sends to the other member of an existing chat.
    pub async fn send_to_chat(
        &self,
        chat_id: i64,
        sender_id: i64,
        draft: MessageDraft,
        echo_to_sender: bool,
    ) -> Result<MessageEntity, error::SystemError> {
        let receiver_id = self.counterpart(chat_id, sender_id).await?;
        self.send_message(sender_id, receiver_id, draft, echo_to_sender).await
    }

    async fn upgrade_to_delivered(
        &self,
        message_id: i64,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let mut tx = self.store.begin().await?;
        let message = self.store.mark_delivered(message_id, &mut tx).await?;
        self.store.commit(tx).await?;
        Ok(message)
    }

    /// Marks everything the reader received in the chat as read and tells each
    /// sender. Returns the messages that changed; a second call returns none.
    pub async fn mark_read(
        &self,
        chat_id: i64,
        reader_id: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let mut tx = self.store.begin().await?;
        let chat = self.member_chat(chat_id, reader_id, &mut tx).await?;
        let updated = self.store.mark_read(chat.id, reader_id, &mut tx).await?;
        self.store.commit(tx).await?;

        for message in &updated {
            let frame =
                ServerFrame::StatusUpdate { message_id: message.id, status: MessageStatus::Read };
            self.connections.deliver(message.sender_id, &frame).await;
        }

        if !updated.is_empty() {
            tracing::debug!("User {reader_id} read {} message(s) in chat {chat_id}", updated.len());
        }
        Ok(updated)
    }

    pub async fn list_chats(&self, user_id: i64) -> Result<Vec<ChatSummary>, error::SystemError> {
        let mut tx = self.store.begin().await?;
        let rows = self.store.find_chat_summaries(user_id, &mut tx).await?;
        self.store.commit(tx).await?;

        Ok(rows.into_iter().map(|row| ChatSummary::from_row(row, user_id)).collect())
    }

    /// Oldest first, strictly below `before_id` when given.
    pub async fn get_messages(
        &self,
        chat_id: i64,
        user_id: i64,
        limit: i64,
        before_id: Option<i64>,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(error::SystemError::bad_request(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let mut tx = self.store.begin().await?;
        let chat = self.member_chat(chat_id, user_id, &mut tx).await?;
        let query = MessageQuery { chat_id: chat.id, before_id, limit };
        let mut messages = self.store.find_messages(&query, &mut tx).await?;
        self.store.commit(tx).await?;

        messages.reverse();
        Ok(messages)
    }

    pub async fn upload_media(
        &self,
        chat_id: i64,
        sender_id: i64,
        media_type: MessageType,
        filename: &str,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Result<UploadMediaResponse, error::SystemError> {
        let mut tx = self.store.begin().await?;
        let chat = self.member_chat(chat_id, sender_id, &mut tx).await?;
        self.store.commit(tx).await?;

        let extension = self.upload.validate(media_type, filename, bytes.len())?;
        let key = object_key(media_type, sender_id, chat.id, &extension);
        let content_type = content_type.unwrap_or_else(|| {
            mime_guess::from_path(filename).first_or_octet_stream().essence_str().to_string()
        });

        let url = self.blobs.upload(&key, bytes, &content_type).await?;
        tracing::info!("User {sender_id} uploaded {key} to chat {}", chat.id);

        Ok(UploadMediaResponse { url, _type: media_type })
    }
}
