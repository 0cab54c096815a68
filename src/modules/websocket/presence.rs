/// Presence Registry
///
/// Tracks which users hold a live connection on *some* server process.
/// Entries are ephemeral Redis keys with a TTL that the owning process keeps
/// refreshing from the heartbeat; a crashed process therefore leaves no
/// permanent ghost entries.
///
/// Redis key schema:
/// - `presence:{user_id}` → "1" (TTL = presence_ttl)
use deadpool_redis::redis::AsyncCommands;

use crate::api::error;

const PRESENCE_PREFIX: &str = "presence:";

#[async_trait::async_trait]
pub trait PresenceRegistry: Send + Sync {
    async fn mark_online(&self, user_id: i64, ttl: u64) -> Result<(), error::SystemError>;

    async fn mark_offline(&self, user_id: i64) -> Result<(), error::SystemError>;

    /// `Err(PresenceUnavailable)` when the store cannot be reached, never `Ok(false)`.
    async fn is_online(&self, user_id: i64) -> Result<bool, error::SystemError>;

    async fn refresh(&self, user_id: i64, ttl: u64) -> Result<(), error::SystemError>;
}

#[derive(Clone)]
pub struct RedisPresenceRegistry {
    pool: deadpool_redis::Pool,
}

impl RedisPresenceRegistry {
    pub fn new(pool: deadpool_redis::Pool) -> Self {
        Self { pool }
    }

    fn key(user_id: i64) -> String {
        format!("{PRESENCE_PREFIX}{user_id}")
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, error::SystemError> {
        self.pool.get().await.map_err(error::SystemError::presence_unavailable)
    }
}

#[async_trait::async_trait]
impl PresenceRegistry for RedisPresenceRegistry {
    async fn mark_online(&self, user_id: i64, ttl: u64) -> Result<(), error::SystemError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(Self::key(user_id), "1", ttl)
            .await
            .map_err(error::SystemError::presence_unavailable)
    }

    async fn mark_offline(&self, user_id: i64) -> Result<(), error::SystemError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(Self::key(user_id)).await.map_err(error::SystemError::presence_unavailable)
    }

    async fn is_online(&self, user_id: i64) -> Result<bool, error::SystemError> {
        let mut conn = self.conn().await?;
        conn.exists::<_, bool>(Self::key(user_id))
            .await
            .map_err(error::SystemError::presence_unavailable)
    }

    async fn refresh(&self, user_id: i64, ttl: u64) -> Result<(), error::SystemError> {
        // SETEX rather than EXPIRE so an entry evicted mid-session comes back
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(Self::key(user_id), "1", ttl)
            .await
            .map_err(error::SystemError::presence_unavailable)
    }
}
