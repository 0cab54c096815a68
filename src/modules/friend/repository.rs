use crate::api::error;
use crate::modules::friend::schema::FriendshipStatus;
use crate::utils::CanonicalPair;

/// Read-only view of the relationship store owned by the friendship workflow.
#[async_trait::async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn find_link_status(
        &self,
        pair: &CanonicalPair,
    ) -> Result<Option<FriendshipStatus>, error::SystemError>;
}
