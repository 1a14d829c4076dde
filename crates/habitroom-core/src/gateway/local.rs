//! In-process gateway: containers and prompts live in memory.
//!
//! Used by the CLI (prompts are answered on the console) and by tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{HabitPrompt, Member, MessageHandle, MessagingGateway};
use crate::error::GatewayError;
use crate::model::{GroupId, UserId};

/// A prompt the gateway has "sent".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentPrompt {
    pub handle: MessageHandle,
    pub member: Member,
    pub prompt: HabitPrompt,
}

#[derive(Default)]
struct LocalState {
    next_container: u64,
    next_message: u64,
    members: HashMap<UserId, Member>,
    containers: Vec<(GroupId, String)>,
    access: HashSet<(UserId, GroupId)>,
    outbox: Vec<SentPrompt>,
    disabled: HashSet<MessageHandle>,
}

#[derive(Default)]
pub struct LocalGateway {
    state: Mutex<LocalState>,
}

impl LocalGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register_member(&self, member: Member) {
        self.state().members.insert(member.id, member);
    }

    /// Track a container that already exists, e.g. a group loaded from the
    /// store. New containers get ids above every adopted one.
    pub fn adopt_container(&self, id: GroupId, name: impl Into<String>) {
        let mut state = self.state();
        state.next_container = state.next_container.max(id.0);
        state.containers.push((id, name.into()));
    }

    pub fn containers(&self) -> Vec<(GroupId, String)> {
        self.state().containers.clone()
    }

    pub fn sent(&self) -> Vec<SentPrompt> {
        self.state().outbox.clone()
    }

    /// Sent prompts whose controls are still enabled.
    pub fn open_prompts(&self) -> Vec<SentPrompt> {
        let state = self.state();
        state
            .outbox
            .iter()
            .filter(|p| !state.disabled.contains(&p.handle))
            .cloned()
            .collect()
    }

    pub fn is_disabled(&self, handle: &MessageHandle) -> bool {
        self.state().disabled.contains(handle)
    }

    pub fn has_access(&self, user: UserId, group: GroupId) -> bool {
        self.state().access.contains(&(user, group))
    }
}

#[async_trait]
impl MessagingGateway for LocalGateway {
    fn cached_member(&self, user: UserId) -> Option<Member> {
        self.state().members.get(&user).cloned()
    }

    async fn fetch_member(&self, _user: UserId) -> Result<Option<Member>, GatewayError> {
        Ok(None)
    }

    async fn send_prompt(
        &self,
        group: GroupId,
        member: &Member,
        prompt: &HabitPrompt,
    ) -> Result<MessageHandle, GatewayError> {
        let mut state = self.state();
        state.next_message += 1;
        let handle = MessageHandle {
            group_id: group,
            message_id: state.next_message,
        };
        info!(
            group_id = %group,
            user_id = %member.id,
            habit = %prompt.habit_name,
            week = %prompt.week_key,
            "{}, have you completed your habit this week?",
            member.display_name
        );
        state.outbox.push(SentPrompt {
            handle: handle.clone(),
            member: member.clone(),
            prompt: prompt.clone(),
        });
        Ok(handle)
    }

    async fn disable_prompt(&self, handle: &MessageHandle) -> Result<(), GatewayError> {
        let mut state = self.state();
        if !state.outbox.iter().any(|p| &p.handle == handle) {
            return Err(GatewayError::NotFound(format!(
                "message {} in group {}",
                handle.message_id, handle.group_id
            )));
        }
        state.disabled.insert(handle.clone());
        Ok(())
    }

    async fn create_group_container(&self, name: &str) -> Result<GroupId, GatewayError> {
        let mut state = self.state();
        state.next_container += 1;
        let id = GroupId(state.next_container);
        state.containers.push((id, name.to_string()));
        info!(group_id = %id, name, "created group container");
        Ok(id)
    }

    async fn grant_access(&self, user: UserId, group: GroupId) -> Result<(), GatewayError> {
        let mut state = self.state();
        if !state.containers.iter().any(|(id, _)| *id == group) {
            return Err(GatewayError::NotFound(format!("container {group}")));
        }
        state.access.insert((user, group));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HabitId;

    #[tokio::test]
    async fn records_prompts_and_disables_them() {
        let gateway = LocalGateway::new();
        let member = Member {
            id: UserId(5),
            display_name: "eve".into(),
        };
        gateway.register_member(member.clone());
        assert_eq!(gateway.cached_member(UserId(5)), Some(member.clone()));
        assert_eq!(gateway.fetch_member(UserId(6)).await.unwrap(), None);

        let group = gateway.create_group_container("habit-tracking-1").await.unwrap();
        let prompt = HabitPrompt {
            habit_id: HabitId(1),
            habit_name: "Run".into(),
            week_key: "2024-W40".parse().unwrap(),
        };
        let handle = gateway.send_prompt(group, &member, &prompt).await.unwrap();
        assert_eq!(gateway.open_prompts().len(), 1);

        gateway.disable_prompt(&handle).await.unwrap();
        assert!(gateway.is_disabled(&handle));
        assert!(gateway.open_prompts().is_empty());
        assert_eq!(gateway.sent().len(), 1);
    }

    #[tokio::test]
    async fn grant_requires_existing_container() {
        let gateway = LocalGateway::new();
        gateway.adopt_container(GroupId(41), "habit-tracking-1");
        gateway.grant_access(UserId(2), GroupId(41)).await.unwrap();
        let group = gateway.create_group_container("habit-tracking-2").await.unwrap();
        assert_eq!(group, GroupId(42));
        gateway.grant_access(UserId(1), group).await.unwrap();
        assert!(gateway.has_access(UserId(1), group));
        assert!(gateway.grant_access(UserId(1), GroupId(7)).await.is_err());
    }
}
