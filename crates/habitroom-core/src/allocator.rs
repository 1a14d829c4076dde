//! First-fit placement of habits into tracking groups.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::AllocationError;
use crate::gateway::MessagingGateway;
use crate::model::{GroupId, UserId, GROUP_CAPACITY};
use crate::storage::HabitStore;

/// Picks the group a new habit joins.
///
/// Groups are scanned in creation order and the first one holding fewer than
/// [`GROUP_CAPACITY`] habits wins. When every group is full a new container
/// named `{prefix}-{n}` is created on the platform and persisted as the next
/// group. Groups are never removed, so numbering stays dense.
pub struct ChannelAllocator {
    store: Arc<dyn HabitStore>,
    gateway: Arc<dyn MessagingGateway>,
    container_prefix: String,
}

impl ChannelAllocator {
    pub fn new(
        store: Arc<dyn HabitStore>,
        gateway: Arc<dyn MessagingGateway>,
        container_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            container_prefix: container_prefix.into(),
        }
    }

    /// # Errors
    /// Fails without persisting anything when the container cannot be
    /// created; see [`AllocationError::is_retryable`].
    pub async fn allocate(&self, owner: UserId) -> Result<GroupId, AllocationError> {
        let groups = self
            .store
            .list_groups()
            .map_err(AllocationError::CapacityQuery)?;

        for group in &groups {
            let count = self
                .store
                .count_habits_in_group(group.id)
                .map_err(AllocationError::CapacityQuery)?;
            if count < GROUP_CAPACITY {
                debug!(user_id = %owner, group_id = %group.id, count, "placing habit in existing group");
                return Ok(group.id);
            }
        }

        let name = format!("{}-{}", self.container_prefix, groups.len() + 1);
        let id = self
            .gateway
            .create_group_container(&name)
            .await
            .map_err(AllocationError::ContainerCreation)?;
        self.store
            .insert_group(id)
            .map_err(AllocationError::Persist)?;
        info!(user_id = %owner, group_id = %id, name = %name, "opened new tracking group");
        Ok(id)
    }
}
