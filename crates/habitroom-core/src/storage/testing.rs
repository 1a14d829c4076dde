//! In-memory store with injectable write conflicts and query failures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{Database, HabitStore, StreakFn};
use crate::error::DatabaseError;
use crate::model::{CompletionRecord, Group, GroupHabit, GroupId, Habit, HabitDraft, HabitId, User, UserId};
use crate::streak::WeekKey;

/// Wraps an in-memory [`Database`]. `record_completion` fails with
/// [`DatabaseError::UniqueViolation`] while conflicts remain, and
/// `count_habits_in_group` fails once `fail_counts` is set.
pub(crate) struct FlakyStore {
    pub inner: Database,
    conflicts: AtomicUsize,
    record_calls: AtomicUsize,
    fail_counts: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: Database::open_memory().unwrap(),
            conflicts: AtomicUsize::new(0),
            record_calls: AtomicUsize::new(0),
            fail_counts: AtomicBool::new(false),
        }
    }

    /// Fail the next `n` completion writes.
    pub fn conflict_times(&self, n: usize) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    pub fn fail_counts(&self) {
        self.fail_counts.store(true, Ordering::SeqCst);
    }

    pub fn record_calls(&self) -> usize {
        self.record_calls.load(Ordering::SeqCst)
    }
}

impl HabitStore for FlakyStore {
    fn add_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.inner.add_user(user)
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>, DatabaseError> {
        self.inner.get_user(id)
    }

    fn insert_group(&self, id: GroupId) -> Result<Group, DatabaseError> {
        self.inner.insert_group(id)
    }

    fn list_groups(&self) -> Result<Vec<Group>, DatabaseError> {
        self.inner.list_groups()
    }

    fn get_group(&self, id: GroupId) -> Result<Option<Group>, DatabaseError> {
        self.inner.get_group(id)
    }

    fn occupy_slot(&self, group: GroupId, user: UserId) -> Result<Option<usize>, DatabaseError> {
        self.inner.occupy_slot(group, user)
    }

    fn insert_habit(
        &self,
        user: UserId,
        group: GroupId,
        draft: &HabitDraft,
    ) -> Result<Habit, DatabaseError> {
        self.inner.insert_habit(user, group, draft)
    }

    fn update_habit(
        &self,
        id: HabitId,
        draft: &HabitDraft,
        group: Option<GroupId>,
    ) -> Result<Habit, DatabaseError> {
        self.inner.update_habit(id, draft, group)
    }

    fn get_habit(&self, id: HabitId) -> Result<Option<Habit>, DatabaseError> {
        self.inner.get_habit(id)
    }

    fn get_user_habits(&self, user: UserId) -> Result<Vec<Habit>, DatabaseError> {
        self.inner.get_user_habits(user)
    }

    fn remove_habit(&self, id: HabitId) -> Result<Option<Habit>, DatabaseError> {
        self.inner.remove_habit(id)
    }

    fn count_habits_in_group(&self, group: GroupId) -> Result<usize, DatabaseError> {
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryFailed("database is locked".into()));
        }
        self.inner.count_habits_in_group(group)
    }

    fn get_habits_in_group(&self, group: GroupId) -> Result<Vec<GroupHabit>, DatabaseError> {
        self.inner.get_habits_in_group(group)
    }

    fn get_latest_completion(&self, habit: HabitId) -> Result<Option<(WeekKey, u32)>, DatabaseError> {
        self.inner.get_latest_completion(habit)
    }

    fn get_completion(
        &self,
        habit: HabitId,
        week: WeekKey,
    ) -> Result<Option<CompletionRecord>, DatabaseError> {
        self.inner.get_completion(habit, week)
    }

    fn record_completion(
        &self,
        habit: HabitId,
        week: WeekKey,
        completed: bool,
        streak: StreakFn<'_>,
    ) -> Result<CompletionRecord, DatabaseError> {
        self.record_calls.fetch_add(1, Ordering::SeqCst);
        let conflicted = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflicted {
            return Err(DatabaseError::UniqueViolation(
                "UNIQUE constraint failed: completions.habit_id, completions.week_key".into(),
            ));
        }
        self.inner.record_completion(habit, week, completed, streak)
    }
}
