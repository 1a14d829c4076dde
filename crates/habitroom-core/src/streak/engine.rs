//! Weekly streak computation.
//!
//! A streak is the number of consecutive week keys with `completed = true`.
//! Continuity is judged on adjacent week keys only, never on elapsed time.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::week::WeekKey;
use crate::error::DatabaseError;
use crate::model::HabitId;
use crate::storage::HabitStore;

const MAX_WRITE_ATTEMPTS: usize = 3;

/// New streak value for `week`, given the habit's most recent record.
///
/// - incomplete → 0
/// - no history → 1
/// - latest record is the same week (resubmission) → unchanged
/// - latest record is the previous week → latest + 1
/// - anything else (gap, backfill behind a newer week) → 1
pub fn next_streak(completed: bool, latest: Option<(WeekKey, u32)>, week: WeekKey) -> u32 {
    if !completed {
        return 0;
    }
    match latest {
        None => 1,
        Some((last_week, last_streak)) if last_week == week => last_streak,
        Some((last_week, last_streak)) if last_week == week.previous() => last_streak + 1,
        Some(_) => 1,
    }
}

/// Applies [`next_streak`] through the store's read-modify-upsert path.
#[derive(Clone)]
pub struct StreakEngine {
    store: Arc<dyn HabitStore>,
}

impl StreakEngine {
    pub fn new(store: Arc<dyn HabitStore>) -> Self {
        Self { store }
    }

    /// Record `completed` for `(habit_id, week)` and return the stored streak.
    ///
    /// A uniqueness conflict means another writer inserted the same week
    /// first; the upsert is retried, and if the conflict persists the row that
    /// writer stored is returned.
    ///
    /// # Errors
    /// Returns any store error other than a uniqueness conflict.
    pub fn update_streak(
        &self,
        habit_id: HabitId,
        week: WeekKey,
        completed: bool,
    ) -> Result<u32, DatabaseError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match self.store.record_completion(habit_id, week, completed, &|latest| {
                next_streak(completed, latest, week)
            }) {
                Ok(record) => {
                    info!(
                        habit_id = %habit_id,
                        week = %week,
                        completed,
                        streak = record.streak,
                        "recorded weekly completion"
                    );
                    return Ok(record.streak);
                }
                Err(DatabaseError::UniqueViolation(msg)) => {
                    warn!(
                        habit_id = %habit_id,
                        week = %week,
                        attempt,
                        "week already written by another writer: {msg}"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        debug!(habit_id = %habit_id, week = %week, "falling back to stored record");
        self.store
            .get_completion(habit_id, week)?
            .map(|record| record.streak)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "completion",
                id: format!("{habit_id}/{week}"),
            })
    }

    /// Streak of the most recent record, 0 when the habit has none.
    pub fn current_streak(&self, habit_id: HabitId) -> Result<u32, DatabaseError> {
        self.store.current_streak(habit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HabitDraft, User, UserId, GroupId};
    use crate::storage::testing::FlakyStore;
    use crate::storage::Database;

    fn key(s: &str) -> WeekKey {
        s.parse().unwrap()
    }

    fn engine_with_habit() -> (StreakEngine, Arc<Database>, HabitId) {
        let db = Arc::new(Database::open_memory().unwrap());
        db.add_user(&User { id: UserId(1), name: "ana".into() }).unwrap();
        db.insert_group(GroupId(100)).unwrap();
        let habit = db
            .insert_habit(UserId(1), GroupId(100), &HabitDraft::new("Run", "mornings", "runner"))
            .unwrap();
        (StreakEngine::new(db.clone()), db, habit.id)
    }

    fn flaky_engine_with_habit() -> (StreakEngine, Arc<FlakyStore>, HabitId) {
        let store = Arc::new(FlakyStore::new());
        store.add_user(&User { id: UserId(1), name: "ana".into() }).unwrap();
        store.insert_group(GroupId(100)).unwrap();
        let habit = store
            .insert_habit(UserId(1), GroupId(100), &HabitDraft::new("Run", "", ""))
            .unwrap();
        (StreakEngine::new(store.clone()), store, habit.id)
    }

    #[test]
    fn pure_rules() {
        let w = key("2024-W10");
        assert_eq!(next_streak(false, Some((w.previous(), 5)), w), 0);
        assert_eq!(next_streak(true, None, w), 1);
        assert_eq!(next_streak(true, Some((w, 4)), w), 4);
        assert_eq!(next_streak(true, Some((w.previous(), 4)), w), 5);
        assert_eq!(next_streak(true, Some((key("2024-W08"), 4)), w), 1);
        // backfilling behind a newer record resets conservatively
        assert_eq!(next_streak(true, Some((key("2024-W12"), 4)), w), 1);
    }

    #[test]
    fn consecutive_weeks_accumulate() {
        let (engine, _db, habit) = engine_with_habit();
        let w1 = key("2024-W51");
        assert_eq!(engine.update_streak(habit, w1, true).unwrap(), 1);
        assert_eq!(engine.update_streak(habit, w1.next(), true).unwrap(), 2);
        assert_eq!(engine.update_streak(habit, w1.next().next(), true).unwrap(), 3);
        // crosses into 2025-W01
        assert_eq!(engine.update_streak(habit, key("2025-W01"), true).unwrap(), 4);
    }

    #[test]
    fn skipped_week_resets_to_one() {
        let (engine, _db, habit) = engine_with_habit();
        let w1 = key("2024-W20");
        engine.update_streak(habit, w1, true).unwrap();
        assert_eq!(engine.update_streak(habit, w1.next().next(), true).unwrap(), 1);
    }

    #[test]
    fn same_week_resubmission_is_idempotent() {
        let (engine, db, habit) = engine_with_habit();
        let w = key("2024-W20");
        engine.update_streak(habit, w.previous(), true).unwrap();
        assert_eq!(engine.update_streak(habit, w, true).unwrap(), 2);
        assert_eq!(engine.update_streak(habit, w, true).unwrap(), 2);
        let record = db.get_completion(habit, w).unwrap().unwrap();
        assert!(record.completed);
        assert_eq!(record.streak, 2);
    }

    #[test]
    fn incompletion_resets_to_zero_and_overwrites_same_week() {
        let (engine, db, habit) = engine_with_habit();
        let w = key("2024-W30");
        engine.update_streak(habit, w.previous(), true).unwrap();
        engine.update_streak(habit, w, true).unwrap();
        assert_eq!(engine.update_streak(habit, w, false).unwrap(), 0);
        let record = db.get_completion(habit, w).unwrap().unwrap();
        assert!(!record.completed);
        assert_eq!(engine.current_streak(habit).unwrap(), 0);
    }

    #[test]
    fn write_conflict_is_retried() {
        let (engine, store, habit) = flaky_engine_with_habit();
        let w = key("2024-W20");
        store.inner.record_completion(habit, w.previous(), true, &|_| 3).unwrap();

        store.conflict_times(MAX_WRITE_ATTEMPTS - 1);
        assert_eq!(engine.update_streak(habit, w, true).unwrap(), 4);
        assert_eq!(store.record_calls(), MAX_WRITE_ATTEMPTS);
        assert_eq!(store.get_completion(habit, w).unwrap().unwrap().streak, 4);
    }

    #[test]
    fn persistent_conflict_returns_stored_streak() {
        let (engine, store, habit) = flaky_engine_with_habit();
        let w = key("2024-W20");
        // What the competing writer stored for the same week.
        store.inner.record_completion(habit, w, true, &|_| 7).unwrap();

        store.conflict_times(usize::MAX);
        assert_eq!(engine.update_streak(habit, w, false).unwrap(), 7);
        assert_eq!(store.record_calls(), MAX_WRITE_ATTEMPTS);
        assert!(store.get_completion(habit, w).unwrap().unwrap().completed);
    }

    #[test]
    fn persistent_conflict_without_stored_row_is_not_found() {
        let (engine, store, habit) = flaky_engine_with_habit();
        store.conflict_times(usize::MAX);
        let err = engine.update_streak(habit, key("2024-W20"), true).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { entity: "completion", .. }));
        assert_eq!(store.record_calls(), MAX_WRITE_ATTEMPTS);
    }
}
