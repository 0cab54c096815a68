use serde::{Deserialize, Serialize};
use sqlx::prelude::Type;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Type, Serialize, Deserialize)]
#[sqlx(type_name = "friendship_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

impl FriendshipStatus {
    pub fn allows_messaging(self) -> bool {
        self == FriendshipStatus::Accepted
    }
}
