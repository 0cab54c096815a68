use futures_util::StreamExt;
use std::sync::Arc;

use crate::{
    api::error,
    configs::KeyValueCache,
    modules::{
        friend::{repository::RelationshipStore, schema::FriendshipStatus},
        websocket::fanout::FanoutBus,
    },
    utils::CanonicalPair,
};

const CACHE_PREFIX: &str = "friendship:";

/// The friendship workflow publishes `"{user_a}:{user_b}"` here on every link change.
pub const LINK_CHANGES_CHANNEL: &str = "friendship:changed";

fn parse_link_change(payload: &str) -> Option<(i64, i64)> {
    let (a, b) = payload.split_once(':')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

/// Authorizes messaging between two users.
///
/// Only `accepted` links are cached, under the canonical pair, and only for
/// `cache_ttl` seconds. A link that leaves `accepted` therefore stops granting
/// access after at most one TTL, or immediately once `invalidate` is called.
#[derive(Clone)]
pub struct FriendshipGate {
    store: Arc<dyn RelationshipStore>,
    cache: Arc<dyn KeyValueCache>,
    cache_ttl: u64,
}

impl FriendshipGate {
    pub fn with_dependencies(
        store: Arc<dyn RelationshipStore>,
        cache: Arc<dyn KeyValueCache>,
        cache_ttl: u64,
    ) -> Self {
        FriendshipGate { store, cache, cache_ttl }
    }

    pub async fn require_linked(&self, user_a: i64, user_b: i64) -> Result<(), error::SystemError> {
        let pair = CanonicalPair::new(user_a, user_b)?;
        let key = pair.cache_key(CACHE_PREFIX);

        match self.cache.get_raw(&key).await {
            Ok(Some(raw)) => {
                if let Ok(status) = serde_json::from_slice::<FriendshipStatus>(&raw) {
                    if status.allows_messaging() {
                        return Ok(());
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Friendship cache read failed for {key}: {e}"),
        }

        match self.store.find_link_status(&pair).await? {
            Some(status) if status.allows_messaging() => {
                let raw = serde_json::to_vec(&status)?;
                if let Err(e) = self.cache.set_raw(&key, raw, self.cache_ttl).await {
                    tracing::warn!("Friendship cache write failed for {key}: {e}");
                }
                Ok(())
            }
            status => {
                tracing::debug!("Messaging denied for {:?}: link status {:?}", pair, status);
                Err(error::SystemError::forbidden("Users are not linked"))
            }
        }
    }

    pub async fn invalidate(&self, user_a: i64, user_b: i64) -> Result<(), error::SystemError> {
        let pair = CanonicalPair::new(user_a, user_b)?;
        self.cache.delete(&pair.cache_key(CACHE_PREFIX)).await
    }

    /// Subscribes to link changes and invalidates each announced pair.
    /// The subscription is live when this returns; the task ends with the stream.
    pub async fn watch_link_changes(
        self: Arc<Self>,
        bus: &dyn FanoutBus,
    ) -> Result<tokio::task::JoinHandle<()>, error::SystemError> {
        let mut changes = bus.subscribe(LINK_CHANGES_CHANNEL).await?;

        Ok(actix_web::rt::spawn(async move {
            while let Some(payload) = changes.next().await {
                let Some((user_a, user_b)) = parse_link_change(&payload) else {
                    tracing::warn!("Ignoring malformed link change {payload:?}");
                    continue;
                };
                match self.invalidate(user_a, user_b).await {
                    Ok(()) => tracing::debug!("Invalidated cached link {user_a}:{user_b}"),
                    Err(e) => tracing::warn!("Could not invalidate link {user_a}:{user_b}: {e}"),
                }
            }
            tracing::info!("Link change subscription ended");
        }))
    }
}
