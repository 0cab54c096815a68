use crate::{
    api::error,
    modules::friend::{repository::RelationshipStore, schema::FriendshipStatus},
    utils::CanonicalPair,
};

#[derive(Clone)]
pub struct FriendRepositoryPg {
    pool: sqlx::PgPool,
}

impl FriendRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RelationshipStore for FriendRepositoryPg {
    async fn find_link_status(
        &self,
        pair: &CanonicalPair,
    ) -> Result<Option<FriendshipStatus>, error::SystemError> {
        // rows may be stored in either direction
        let status = sqlx::query_scalar::<_, FriendshipStatus>(
            r#"
            SELECT status
            FROM friendships
            WHERE ((user_id = $1 AND friend_id = $2)
                OR (user_id = $2 AND friend_id = $1))
            AND deleted_at IS NULL
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(pair.low)
        .bind(pair.high)
        .fetch_optional(&self.pool)
        .await?;

        Ok(status)
    }
}
