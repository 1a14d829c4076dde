//! Messaging gateway: the chat platform as seen by the core.
//!
//! The core never talks to a platform directly. Check rounds, allocation and
//! declarations go through [`MessagingGateway`]; transports implement it.

mod local;
#[cfg(test)]
pub(crate) mod testing;

pub use local::{LocalGateway, SentPrompt};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::model::{GroupId, HabitId, UserId};
use crate::streak::WeekKey;

/// A platform member resolved from a user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    pub display_name: String,
}

/// Reference to a sent prompt, used to disable its controls later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub group_id: GroupId,
    pub message_id: u64,
}

/// What a weekly prompt asks about. The interactive controls carry
/// `habit_id` and `week_key` back in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitPrompt {
    pub habit_id: HabitId,
    pub habit_name: String,
    pub week_key: WeekKey,
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Member from the platform's local cache, without a remote call.
    fn cached_member(&self, user: UserId) -> Option<Member>;

    /// Remote member lookup. `Ok(None)` when the user left the platform.
    async fn fetch_member(&self, user: UserId) -> Result<Option<Member>, GatewayError>;

    /// Post an interactive yes/no prompt for `member` in the group's container.
    async fn send_prompt(
        &self,
        group: GroupId,
        member: &Member,
        prompt: &HabitPrompt,
    ) -> Result<MessageHandle, GatewayError>;

    /// Disable the prompt's controls so it can't be answered again.
    async fn disable_prompt(&self, handle: &MessageHandle) -> Result<(), GatewayError>;

    /// Create the container hosting a new group; its id becomes the group id.
    async fn create_group_container(&self, name: &str) -> Result<GroupId, GatewayError>;

    /// Let `user` read and post in the group's container.
    async fn grant_access(&self, user: UserId, group: GroupId) -> Result<(), GatewayError>;
}
