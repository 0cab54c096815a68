use crate::{
    api::error,
    modules::chat::{
        model::{ChatSummaryRow, InsertMessage, MessageQuery},
        repository::ChatRepository,
        schema::{ChatEntity, MessageEntity},
    },
    utils::CanonicalPair,
};

#[derive(Clone)]
pub struct ChatRepositoryPg {
    pool: sqlx::PgPool,
}

impl ChatRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ChatRepository for ChatRepositoryPg {
    type Tx = sqlx::Transaction<'static, sqlx::Postgres>;

    async fn begin(&self) -> Result<Self::Tx, error::SystemError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), error::SystemError> {
        tx.commit().await?;
        Ok(())
    }

    async fn find_chat_by_id(
        &self,
        chat_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Option<ChatEntity>, error::SystemError> {
        let chat = sqlx::query_as::<_, ChatEntity>("SELECT * FROM chats WHERE id = $1")
            .bind(chat_id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(chat)
    }

    async fn find_chat_by_pair(
        &self,
        pair: &CanonicalPair,
        tx: &mut Self::Tx,
    ) -> Result<Option<ChatEntity>, error::SystemError> {
        let chat = sqlx::query_as::<_, ChatEntity>(
            "SELECT * FROM chats WHERE user_low_id = $1 AND user_high_id = $2",
        )
        .bind(pair.low)
        .bind(pair.high)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(chat)
    }

    async fn insert_chat_if_absent(
        &self,
        pair: &CanonicalPair,
        tx: &mut Self::Tx,
    ) -> Result<Option<ChatEntity>, error::SystemError> {
        // blocks on a concurrent uncommitted insert of the same pair, then yields no row
        let chat = sqlx::query_as::<_, ChatEntity>(
            r#"
            INSERT INTO chats (user_low_id, user_high_id)
            VALUES ($1, $2)
            ON CONFLICT (user_low_id, user_high_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(pair.low)
        .bind(pair.high)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(chat)
    }

    async fn find_message_in_chat(
        &self,
        chat_id: i64,
        message_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let message = sqlx::query_as::<_, MessageEntity>(
            "SELECT * FROM messages WHERE id = $1 AND chat_id = $2",
        )
        .bind(message_id)
        .bind(chat_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(message)
    }

    async fn insert_message(
        &self,
        message: &InsertMessage,
        tx: &mut Self::Tx,
    ) -> Result<MessageEntity, error::SystemError> {
        let message = sqlx::query_as::<_, MessageEntity>(
            r#"
            INSERT INTO messages (chat_id, sender_id, content, type, reply_to_id, status)
            VALUES ($1, $2, $3, $4, $5, 'sent')
            RETURNING *
            "#,
        )
        .bind(message.chat_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message._type)
        .bind(message.reply_to_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(message)
    }

    async fn mark_delivered(
        &self,
        message_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Option<MessageEntity>, error::SystemError> {
        let message = sqlx::query_as::<_, MessageEntity>(
            r#"
            UPDATE messages
            SET status = 'delivered', delivered_at = NOW()
            WHERE id = $1 AND status = 'sent'
            RETURNING *
            "#,
        )
        .bind(message_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(message)
    }

    async fn mark_read(
        &self,
        chat_id: i64,
        reader_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        // uses messages_unread_idx
        let messages = sqlx::query_as::<_, MessageEntity>(
            r#"
            UPDATE messages
            SET status = 'read',
                read_at = NOW(),
                delivered_at = COALESCE(delivered_at, NOW())
            WHERE chat_id = $1 AND sender_id <> $2 AND status < 'read'
            RETURNING *
            "#,
        )
        .bind(chat_id)
        .bind(reader_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(messages)
    }

    async fn find_messages(
        &self,
        query: &MessageQuery,
        tx: &mut Self::Tx,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        // has index on (chat_id, id DESC)
        let messages = if let Some(before_id) = query.before_id {
            sqlx::query_as::<_, MessageEntity>(
                "SELECT * FROM messages WHERE chat_id = $1 AND id < $2 ORDER BY id DESC LIMIT $3",
            )
            .bind(query.chat_id)
            .bind(before_id)
            .bind(query.limit)
            .fetch_all(&mut **tx)
            .await?
        } else {
            sqlx::query_as::<_, MessageEntity>(
                "SELECT * FROM messages WHERE chat_id = $1 ORDER BY id DESC LIMIT $2",
            )
            .bind(query.chat_id)
            .bind(query.limit)
            .fetch_all(&mut **tx)
            .await?
        };

        Ok(messages)
    }

    async fn find_chat_summaries(
        &self,
        user_id: i64,
        tx: &mut Self::Tx,
    ) -> Result<Vec<ChatSummaryRow>, error::SystemError> {
        let rows = sqlx::query_as::<_, ChatSummaryRow>(
            r#"
            SELECT
                c.id AS chat_id,
                c.user_low_id,
                c.user_high_id,
                c.created_at,

                m.id AS last_message_id,
                m.sender_id AS last_sender_id,
                m.content AS last_content,
                m.type AS last_type,
                m.status AS last_status,
                m.created_at AS last_created_at,

                (
                    SELECT COUNT(*)
                    FROM messages u
                    WHERE u.chat_id = c.id AND u.sender_id <> $1 AND u.status <> 'read'
                ) AS unread_count
            FROM chats c
            LEFT JOIN LATERAL (
                SELECT id, sender_id, content, type, status, created_at
                FROM messages
                WHERE chat_id = c.id
                ORDER BY id DESC
                LIMIT 1
            ) m ON true
            WHERE c.user_low_id = $1 OR c.user_high_id = $1
            ORDER BY COALESCE(m.created_at, c.created_at) DESC, c.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows)
    }
}
