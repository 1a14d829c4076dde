//! Habit declaration flow: declare, edit, move, remove and list habits.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::allocator::ChannelAllocator;
use crate::error::{CoreError, DatabaseError};
use crate::gateway::{Member, MessagingGateway};
use crate::model::{GroupId, Habit, HabitDraft, HabitId, User, UserId};
use crate::storage::HabitStore;
use crate::streak::{StreakEngine, WeekKey};

/// A habit with its current streak, as shown in a user's habit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitSummary {
    #[serde(flatten)]
    pub habit: Habit,
    pub streak: u32,
}

pub struct DeclarationService {
    store: Arc<dyn HabitStore>,
    gateway: Arc<dyn MessagingGateway>,
    allocator: ChannelAllocator,
    streaks: StreakEngine,
    /// Serializes allocate + insert so two declarations can't both take the
    /// last place in a group.
    placement: Mutex<()>,
}

impl DeclarationService {
    pub fn new(
        store: Arc<dyn HabitStore>,
        gateway: Arc<dyn MessagingGateway>,
        container_prefix: impl Into<String>,
    ) -> Self {
        Self {
            allocator: ChannelAllocator::new(
                Arc::clone(&store),
                Arc::clone(&gateway),
                container_prefix,
            ),
            streaks: StreakEngine::new(Arc::clone(&store)),
            store,
            gateway,
            placement: Mutex::new(()),
        }
    }

    /// Register the member if needed, place the habit in a group and give
    /// the member access to it.
    pub async fn declare(&self, member: &Member, draft: &HabitDraft) -> Result<Habit, CoreError> {
        let draft = draft.validated()?;
        let _placement = self.placement.lock().await;

        self.store.add_user(&User {
            id: member.id,
            name: member.display_name.clone(),
        })?;
        let group = self.allocator.allocate(member.id).await?;
        let habit = self.store.insert_habit(member.id, group, &draft)?;
        self.grant(member.id, group).await;

        info!(habit_id = %habit.id, user_id = %member.id, group_id = %group, "habit declared");
        Ok(habit)
    }

    /// Change a habit's text. The habit stays in its group.
    pub fn edit(&self, habit: HabitId, draft: &HabitDraft) -> Result<Habit, CoreError> {
        let draft = draft.validated()?;
        let updated = self.store.update_habit(habit, &draft, None)?;
        info!(habit_id = %habit, "habit updated");
        Ok(updated)
    }

    /// Change a habit's text and move it to `group`.
    pub async fn reassign(
        &self,
        habit: HabitId,
        draft: &HabitDraft,
        group: GroupId,
    ) -> Result<Habit, CoreError> {
        let draft = draft.validated()?;
        let _placement = self.placement.lock().await;

        if self.store.get_group(group)?.is_none() {
            return Err(DatabaseError::NotFound {
                entity: "group",
                id: group.to_string(),
            }
            .into());
        }
        let updated = self.store.update_habit(habit, &draft, Some(group))?;
        self.grant(updated.user_id, group).await;
        info!(habit_id = %habit, group_id = %group, "habit moved");
        Ok(updated)
    }

    /// Delete a habit with its history. `None` if it did not exist.
    pub fn remove(&self, habit: HabitId) -> Result<Option<Habit>, CoreError> {
        let removed = self.store.remove_habit(habit)?;
        match &removed {
            Some(h) => info!(habit_id = %habit, user_id = %h.user_id, "habit removed"),
            None => warn!(habit_id = %habit, "habit to remove does not exist"),
        }
        Ok(removed)
    }

    pub fn overview(&self, user: UserId) -> Result<Vec<HabitSummary>, CoreError> {
        self.store
            .get_user_habits(user)?
            .into_iter()
            .map(|habit| {
                let streak = self.store.current_streak(habit.id)?;
                Ok(HabitSummary { habit, streak })
            })
            .collect()
    }

    /// Record a completion outside a check round (manual entry, backfill).
    pub fn record(&self, habit: HabitId, week: WeekKey, completed: bool) -> Result<u32, CoreError> {
        Ok(self.streaks.update_streak(habit, week, completed)?)
    }

    async fn grant(&self, user: UserId, group: GroupId) {
        if let Err(e) = self.gateway.grant_access(user, group).await {
            warn!(user_id = %user, group_id = %group, "failed to grant group access: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::LocalGateway;
    use crate::model::GROUP_CAPACITY;
    use crate::storage::Database;

    fn member(id: u64) -> Member {
        Member {
            id: UserId(id),
            display_name: format!("user{id}"),
        }
    }

    fn service() -> (Arc<Database>, Arc<LocalGateway>, DeclarationService) {
        let store = Arc::new(Database::open_memory().unwrap());
        let gateway = Arc::new(LocalGateway::new());
        let service = DeclarationService::new(store.clone(), gateway.clone(), "habit-tracking");
        (store, gateway, service)
    }

    #[tokio::test]
    async fn declare_places_habit_and_grants_access() {
        let (store, gateway, service) = service();
        let habit = service
            .declare(&member(1), &HabitDraft::new("  Run ", "park at 7", "a runner"))
            .await
            .unwrap();
        assert_eq!(habit.name, "Run");
        let group = habit.group_id.unwrap();
        assert!(gateway.has_access(UserId(1), group));
        assert_eq!(store.get_user(UserId(1)).unwrap().unwrap().name, "user1");
    }

    #[tokio::test]
    async fn declare_rejects_blank_name() {
        let (store, _, service) = service();
        let err = service
            .declare(&member(1), &HabitDraft::new("   ", "", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(store.list_groups().unwrap().is_empty());
    }

    #[tokio::test]
    async fn overview_reports_streaks() {
        let (_, _, service) = service();
        let habit = service
            .declare(&member(1), &HabitDraft::new("Run", "", ""))
            .await
            .unwrap();
        for w in ["2024-W40", "2024-W41"] {
            service.record(habit.id, w.parse().unwrap(), true).unwrap();
        }
        let overview = service.overview(UserId(1)).unwrap();
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].streak, 2);
    }

    #[tokio::test]
    async fn edit_keeps_group_and_reassign_moves() {
        let (store, gateway, service) = service();
        let habit = service
            .declare(&member(1), &HabitDraft::new("Run", "", ""))
            .await
            .unwrap();
        let edited = service
            .edit(habit.id, &HabitDraft::new("Run far", "", ""))
            .unwrap();
        assert_eq!(edited.group_id, habit.group_id);

        let other = gateway.create_group_container("habit-tracking-2").await.unwrap();
        store.insert_group(other).unwrap();
        let moved = service
            .reassign(habit.id, &HabitDraft::new("Run far", "", ""), other)
            .await
            .unwrap();
        assert_eq!(moved.group_id, Some(other));
        assert!(gateway.has_access(UserId(1), other));

        let missing = service
            .reassign(habit.id, &HabitDraft::new("Run", "", ""), GroupId(404))
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn reassign_refuses_group_holding_eight_habits() {
        let (store, gateway, service) = service();
        let run = HabitDraft::new("Run", "", "");
        service.declare(&member(1), &run).await.unwrap();
        let first = service.declare(&member(1), &run).await.unwrap();
        for id in 2..=7 {
            service.declare(&member(id), &run).await.unwrap();
        }
        let full = first.group_id.unwrap();
        assert_eq!(store.count_habits_in_group(full).unwrap(), GROUP_CAPACITY);

        let third = service.declare(&member(1), &run).await.unwrap();
        assert_ne!(third.group_id, Some(full));

        let err = service.reassign(third.id, &run, full).await.unwrap_err();
        assert!(matches!(err, CoreError::Database(DatabaseError::GroupFull(_))));
        assert_eq!(store.count_habits_in_group(full).unwrap(), GROUP_CAPACITY);
        assert_eq!(store.get_habit(third.id).unwrap().unwrap().group_id, third.group_id);
        assert_eq!(gateway.containers().len(), 2);
    }

    #[tokio::test]
    async fn remove_reports_missing_habit() {
        let (_, _, service) = service();
        let habit = service
            .declare(&member(1), &HabitDraft::new("Run", "", ""))
            .await
            .unwrap();
        assert!(service.remove(habit.id).unwrap().is_some());
        assert!(service.remove(habit.id).unwrap().is_none());
        assert!(service.overview(UserId(1)).unwrap().is_empty());
    }
}
