use crate::{
    api::error,
    modules::chat::{
        model::{ChatSummaryRow, InsertMessage, MessageQuery},
        schema::{ChatEntity, MessageEntity},
    },
    utils::CanonicalPair,
};

/// Transactional chat store.
///
/// Every call runs inside the unit of work handed in as `tx`; nothing is
/// visible to other units until `commit`. Dropping a `Tx` without committing
/// rolls it back.
#[async_trait::async_trait]
pub trait ChatRepository: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, error::SystemError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), error::SystemError>;

    async fn find_chat_by_id(
        &self,
        chat_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Option<ChatEntity>, error::SystemError>;

    async fn find_chat_by_pair(
        &self,
        pair: &CanonicalPair,
        tx: &mut Self::Tx,
    ) -> Result<Option<ChatEntity>, error::SystemError>;

    /// `None` when another unit of work created the pair first.
    async fn insert_chat_if_absent(
        &self,
        pair: &CanonicalPair,
        tx: &mut Self::Tx,
    ) -> Result<Option<ChatEntity>, error::SystemError>;

    async fn find_message_in_chat(
        &self,
        chat_id: i64,
        message_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Option<MessageEntity>, error::SystemError>;

    async fn insert_message(
        &self,
        message: &InsertMessage,
        tx: &mut Self::Tx,
    ) -> Result<MessageEntity, error::SystemError>;

    /// Moves a `sent` message to `delivered`. `None` if it was already past `sent`.
    async fn mark_delivered(
        &self,
        message_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Option<MessageEntity>, error::SystemError>;

    /// Moves every unread message the reader received in the chat to `read`,
    /// returning only the rows that actually changed.
    async fn mark_read(
        &self,
        chat_id: i64,
        reader_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    /// Newest first.
    async fn find_messages(
        &self,
        query: &MessageQuery,
        tx: &mut Self::Tx,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    /// Most recently active first.
    async fn find_chat_summaries(
        &self,
        user_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Vec<ChatSummaryRow>, error::SystemError>;
}
