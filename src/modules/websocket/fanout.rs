/// Fanout Bus
///
/// Cross-process broadcast of serialized frames. Every server process
/// subscribes to `user:{id}` for each user it holds a connection for; a
/// process that cannot deliver locally publishes to that channel instead.
///
/// Delivery is at-most-once: a publish with no live subscriber is dropped.
use deadpool_redis::redis::{self, AsyncCommands};
use futures_util::{stream::BoxStream, StreamExt};

use crate::api::error;

const USER_CHANNEL_PREFIX: &str = "user:";

pub fn user_channel(user_id: i64) -> String {
    format!("{USER_CHANNEL_PREFIX}{user_id}")
}

#[async_trait::async_trait]
pub trait FanoutBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), error::SystemError>;

    /// Resolves once the subscription is active. Dropping the stream cancels it.
    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<BoxStream<'static, String>, error::SystemError>;
}

#[derive(Clone)]
pub struct RedisFanoutBus {
    client: redis::Client,
    pool: deadpool_redis::Pool,
}

impl RedisFanoutBus {
    pub fn new(redis_url: &str, pool: deadpool_redis::Pool) -> Result<Self, error::SystemError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client, pool })
    }
}

#[async_trait::async_trait]
impl FanoutBus for RedisFanoutBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), error::SystemError> {
        let mut conn = self.pool.get().await?;
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<BoxStream<'static, String>, error::SystemError> {
        // pub/sub needs a dedicated connection, not a pooled one
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let channel = channel.to_string();
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let payload = msg.get_payload::<String>();
            let channel = channel.clone();
            async move {
                match payload {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!("Dropping undecodable payload on {channel}: {e}");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
