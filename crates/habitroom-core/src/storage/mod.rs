mod config;
pub mod database;
pub mod migrations;
#[cfg(test)]
pub(crate) mod testing;

pub use config::{BackupConfig, CheckConfig, Config, GroupsConfig, TriggerConfig};
pub use database::Database;

use std::path::PathBuf;

use crate::error::{ConfigError, DatabaseError};
use crate::model::{CompletionRecord, Group, GroupHabit, GroupId, Habit, HabitDraft, HabitId, User, UserId};
use crate::streak::WeekKey;

/// Streak calculation handed to [`HabitStore::record_completion`]; receives
/// the habit's latest `(week, streak)` before the write.
pub type StreakFn<'a> = &'a (dyn Fn(Option<(WeekKey, u32)>) -> u32 + Sync);

/// Persistence contract for users, habits, tracking groups and weekly
/// completion records.
///
/// Implementations enforce uniqueness and referential rules only; placement
/// and streak policy live in the allocator and the streak engine. Each call is
/// one unit of work: multi-row operations are atomic.
pub trait HabitStore: Send + Sync {
    /// Insert the user unless one with the same id already exists.
    fn add_user(&self, user: &User) -> Result<(), DatabaseError>;

    fn get_user(&self, id: UserId) -> Result<Option<User>, DatabaseError>;

    /// Persist an empty group, appended after all existing groups.
    fn insert_group(&self, id: GroupId) -> Result<Group, DatabaseError>;

    /// All groups in creation order.
    fn list_groups(&self) -> Result<Vec<Group>, DatabaseError>;

    fn get_group(&self, id: GroupId) -> Result<Option<Group>, DatabaseError>;

    /// Give `user` a slot in `group`: their existing slot if they hold one,
    /// otherwise the first empty slot. `None` when the group is full.
    fn occupy_slot(&self, group: GroupId, user: UserId) -> Result<Option<usize>, DatabaseError>;

    fn insert_habit(
        &self,
        user: UserId,
        group: GroupId,
        draft: &HabitDraft,
    ) -> Result<Habit, DatabaseError>;

    /// Overwrite the habit's fields; move it to `group` when one is given.
    ///
    /// Moving clears the owner's slot in the old group if it held their last
    /// habit there, and occupies a slot in the new group.
    fn update_habit(
        &self,
        id: HabitId,
        draft: &HabitDraft,
        group: Option<GroupId>,
    ) -> Result<Habit, DatabaseError>;

    fn get_habit(&self, id: HabitId) -> Result<Option<Habit>, DatabaseError>;

    fn get_user_habits(&self, user: UserId) -> Result<Vec<Habit>, DatabaseError>;

    /// Delete the habit with its completion records and free the owner's slot
    /// when no other habit of theirs remains in the group.
    fn remove_habit(&self, id: HabitId) -> Result<Option<Habit>, DatabaseError>;

    fn count_habits_in_group(&self, group: GroupId) -> Result<usize, DatabaseError>;

    /// Habits in the group, ordered by habit id.
    fn get_habits_in_group(&self, group: GroupId) -> Result<Vec<GroupHabit>, DatabaseError>;

    /// Most recent record by descending week key.
    fn get_latest_completion(&self, habit: HabitId) -> Result<Option<(WeekKey, u32)>, DatabaseError>;

    fn get_completion(
        &self,
        habit: HabitId,
        week: WeekKey,
    ) -> Result<Option<CompletionRecord>, DatabaseError>;

    /// Read the latest record, compute the new streak with `streak` and
    /// upsert `(habit, week)` in a single transaction.
    fn record_completion(
        &self,
        habit: HabitId,
        week: WeekKey,
        completed: bool,
        streak: StreakFn<'_>,
    ) -> Result<CompletionRecord, DatabaseError>;

    /// Streak of the latest record, 0 when none exists.
    fn current_streak(&self, habit: HabitId) -> Result<u32, DatabaseError> {
        Ok(self.get_latest_completion(habit)?.map_or(0, |(_, streak)| streak))
    }
}

/// Returns `~/.config/habitroom[-dev]/` based on HABITROOM_ENV.
///
/// Set HABITROOM_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("HABITROOM_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("habitroom-dev")
    } else {
        base_dir.join("habitroom")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
