//! SQLite-backed [`HabitStore`].
//!
//! Provides persistent storage for:
//! - Users and their habits
//! - Tracking groups and their eight member slots
//! - Weekly completion records with streak values
//!
//! The connection sits behind a mutex; every trait method locks it for one
//! unit of work and runs multi-statement work inside a transaction, so an
//! early `?` return rolls back and releases the connection.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::migrations;
use super::{HabitStore, StreakFn};
use crate::error::DatabaseError;
use crate::model::{
    CompletionRecord, Group, GroupHabit, GroupId, Habit, HabitDraft, HabitId, User, UserId,
    GROUP_CAPACITY,
};
use crate::streak::WeekKey;

/// SQLite integers are signed; platform ids are stored bit for bit.
trait SqlId {
    fn sql(self) -> i64;
}

impl SqlId for UserId {
    fn sql(self) -> i64 {
        self.0 as i64
    }
}

impl SqlId for GroupId {
    fn sql(self) -> i64 {
        self.0 as i64
    }
}

const HABIT_COLUMNS: &str = "id, user_id, group_id, habit_name, time_location, identity";

/// SQLite database for habits, groups and completion records.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the database file at `path` and apply migrations.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(|source| DatabaseError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, DatabaseError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// File backing this database, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write a consistent copy of the database to `dest`, which must not exist.
    pub fn snapshot_to(&self, dest: &Path) -> Result<(), DatabaseError> {
        let dest = dest.to_string_lossy();
        self.conn().execute("VACUUM INTO ?1", params![dest.as_ref()])?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a transaction open:
        // dropping the transaction rolls it back.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn habit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Habit> {
    Ok(Habit {
        id: HabitId(row.get(0)?),
        user_id: UserId(row.get::<_, i64>(1)? as u64),
        group_id: row.get::<_, Option<i64>>(2)?.map(|id| GroupId(id as u64)),
        name: row.get(3)?,
        time_location: row.get(4)?,
        identity: row.get(5)?,
    })
}

fn load_habit(conn: &Connection, id: HabitId) -> Result<Option<Habit>, DatabaseError> {
    let habit = conn
        .query_row(
            &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1"),
            params![id.0],
            habit_from_row,
        )
        .optional()?;
    Ok(habit)
}

fn load_group(conn: &Connection, id: GroupId) -> Result<Option<Group>, DatabaseError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM tracking_groups WHERE group_id = ?1",
            params![id.sql()],
            |_| Ok(()),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }

    let mut group = Group::new(id);
    let mut stmt = conn.prepare("SELECT slot, user_id FROM group_slots WHERE group_id = ?1")?;
    let rows = stmt.query_map(params![id.sql()], |row| {
        Ok((row.get::<_, i64>(0)? as usize, row.get::<_, i64>(1)? as u64))
    })?;
    for row in rows {
        let (slot, user) = row?;
        if let Some(entry) = group.slots.get_mut(slot) {
            *entry = Some(UserId(user));
        }
    }
    Ok(Some(group))
}

fn occupy_slot_in(
    conn: &Connection,
    group_id: GroupId,
    user: UserId,
) -> Result<Option<usize>, DatabaseError> {
    let group = load_group(conn, group_id)?.ok_or_else(|| DatabaseError::NotFound {
        entity: "group",
        id: group_id.to_string(),
    })?;

    if let Some(slot) = group.slot_of(user) {
        return Ok(Some(slot));
    }
    let Some(slot) = group.first_free_slot() else {
        return Ok(None);
    };
    conn.execute(
        "INSERT INTO group_slots (group_id, slot, user_id) VALUES (?1, ?2, ?3)",
        params![group_id.sql(), slot as i64, user.sql()],
    )?;
    Ok(Some(slot))
}

fn count_habits_in(conn: &Connection, group: GroupId) -> Result<usize, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM habits WHERE group_id = ?1",
        params![group.sql()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Clear `user`'s slot in `group_id` unless they still own a habit there.
fn release_slot_if_unused(
    conn: &Connection,
    group_id: GroupId,
    user: UserId,
) -> Result<(), DatabaseError> {
    let remaining: i64 = conn.query_row(
        "SELECT COUNT(*) FROM habits WHERE group_id = ?1 AND user_id = ?2",
        params![group_id.sql(), user.sql()],
        |row| row.get(0),
    )?;
    if remaining == 0 {
        let cleared = conn.execute(
            "DELETE FROM group_slots WHERE group_id = ?1 AND user_id = ?2",
            params![group_id.sql(), user.sql()],
        )?;
        if cleared > 0 {
            tracing::info!(user_id = %user, group_id = %group_id, "cleared member slot");
        }
    }
    Ok(())
}

fn latest_completion(
    conn: &Connection,
    habit: HabitId,
) -> Result<Option<(WeekKey, u32)>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT week_key, streak FROM completions
             WHERE habit_id = ?1
             ORDER BY week_key DESC
             LIMIT 1",
            params![habit.0],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)),
        )
        .optional()?;

    row.map(|(key, streak)| {
        key.parse::<WeekKey>()
            .map(|week| (week, streak))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    })
    .transpose()
}

fn require_habit(conn: &Connection, habit: HabitId) -> Result<Habit, DatabaseError> {
    load_habit(conn, habit)?.ok_or_else(|| DatabaseError::NotFound {
        entity: "habit",
        id: habit.to_string(),
    })
}

impl HabitStore for Database {
    fn add_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT INTO users (user_id, username) VALUES (?1, ?2)
             ON CONFLICT (user_id) DO NOTHING",
            params![user.id.sql(), user.name],
        )?;
        Ok(())
    }

    fn get_user(&self, id: UserId) -> Result<Option<User>, DatabaseError> {
        let user = self
            .conn()
            .query_row(
                "SELECT user_id, username FROM users WHERE user_id = ?1",
                params![id.sql()],
                |row| {
                    Ok(User {
                        id: UserId(row.get::<_, i64>(0)? as u64),
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    fn insert_group(&self, id: GroupId) -> Result<Group, DatabaseError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(created_seq), 0) + 1 FROM tracking_groups",
            [],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO tracking_groups (group_id, created_seq) VALUES (?1, ?2)",
            params![id.sql(), seq],
        )?;
        tx.commit()?;
        Ok(Group::new(id))
    }

    fn list_groups(&self) -> Result<Vec<Group>, DatabaseError> {
        let conn = self.conn();
        let ids = {
            let mut stmt =
                conn.prepare("SELECT group_id FROM tracking_groups ORDER BY created_seq")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(group) = load_group(&conn, GroupId(id as u64))? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    fn get_group(&self, id: GroupId) -> Result<Option<Group>, DatabaseError> {
        load_group(&self.conn(), id)
    }

    fn occupy_slot(&self, group: GroupId, user: UserId) -> Result<Option<usize>, DatabaseError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let slot = occupy_slot_in(&tx, group, user)?;
        tx.commit()?;
        Ok(slot)
    }

    /// Inserts the habit and occupies the owner's slot in `group` atomically.
    fn insert_habit(
        &self,
        user: UserId,
        group: GroupId,
        draft: &HabitDraft,
    ) -> Result<Habit, DatabaseError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        if occupy_slot_in(&tx, group, user)?.is_none() {
            return Err(DatabaseError::GroupFull(group.0));
        }
        tx.execute(
            "INSERT INTO habits (user_id, group_id, habit_name, time_location, identity)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user.sql(), group.sql(), draft.name, draft.time_location, draft.identity],
        )?;
        let id = HabitId(tx.last_insert_rowid());
        tx.commit()?;

        Ok(Habit {
            id,
            user_id: user,
            group_id: Some(group),
            name: draft.name.clone(),
            time_location: draft.time_location.clone(),
            identity: draft.identity.clone(),
        })
    }

    fn update_habit(
        &self,
        id: HabitId,
        draft: &HabitDraft,
        group: Option<GroupId>,
    ) -> Result<Habit, DatabaseError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let existing = require_habit(&tx, id)?;

        tx.execute(
            "UPDATE habits SET habit_name = ?1, time_location = ?2, identity = ?3 WHERE id = ?4",
            params![draft.name, draft.time_location, draft.identity, id.0],
        )?;

        if let Some(new_group) = group.filter(|g| Some(*g) != existing.group_id) {
            if count_habits_in(&tx, new_group)? >= GROUP_CAPACITY {
                return Err(DatabaseError::GroupFull(new_group.0));
            }
            if occupy_slot_in(&tx, new_group, existing.user_id)?.is_none() {
                return Err(DatabaseError::GroupFull(new_group.0));
            }
            tx.execute(
                "UPDATE habits SET group_id = ?1 WHERE id = ?2",
                params![new_group.sql(), id.0],
            )?;
            if let Some(old_group) = existing.group_id {
                release_slot_if_unused(&tx, old_group, existing.user_id)?;
            }
        }

        let updated = require_habit(&tx, id)?;
        tx.commit()?;
        Ok(updated)
    }

    fn get_habit(&self, id: HabitId) -> Result<Option<Habit>, DatabaseError> {
        load_habit(&self.conn(), id)
    }

    fn get_user_habits(&self, user: UserId) -> Result<Vec<Habit>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![user.sql()], habit_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn remove_habit(&self, id: HabitId) -> Result<Option<Habit>, DatabaseError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let Some(habit) = load_habit(&tx, id)? else {
            return Ok(None);
        };

        tx.execute("DELETE FROM completions WHERE habit_id = ?1", params![id.0])?;
        tx.execute("DELETE FROM habits WHERE id = ?1", params![id.0])?;
        if let Some(group) = habit.group_id {
            release_slot_if_unused(&tx, group, habit.user_id)?;
        }

        tx.commit()?;
        Ok(Some(habit))
    }

    fn count_habits_in_group(&self, group: GroupId) -> Result<usize, DatabaseError> {
        count_habits_in(&self.conn(), group)
    }

    fn get_habits_in_group(&self, group: GroupId) -> Result<Vec<GroupHabit>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, id, habit_name FROM habits WHERE group_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![group.sql()], |row| {
            Ok(GroupHabit {
                user_id: UserId(row.get::<_, i64>(0)? as u64),
                habit_id: HabitId(row.get(1)?),
                habit_name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn get_latest_completion(
        &self,
        habit: HabitId,
    ) -> Result<Option<(WeekKey, u32)>, DatabaseError> {
        latest_completion(&self.conn(), habit)
    }

    fn get_completion(
        &self,
        habit: HabitId,
        week: WeekKey,
    ) -> Result<Option<CompletionRecord>, DatabaseError> {
        let row = self
            .conn()
            .query_row(
                "SELECT completed, streak FROM completions WHERE habit_id = ?1 AND week_key = ?2",
                params![habit.0, week.to_string()],
                |row| Ok((row.get::<_, bool>(0)?, row.get::<_, u32>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(completed, streak)| CompletionRecord {
            habit_id: habit,
            week_key: week,
            completed,
            streak,
        }))
    }

    fn record_completion(
        &self,
        habit: HabitId,
        week: WeekKey,
        completed: bool,
        streak: StreakFn<'_>,
    ) -> Result<CompletionRecord, DatabaseError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        require_habit(&tx, habit)?;

        let new_streak = streak(latest_completion(&tx, habit)?);
        tx.execute(
            "INSERT INTO completions (habit_id, week_key, completed, streak)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (habit_id, week_key)
             DO UPDATE SET completed = excluded.completed, streak = excluded.streak",
            params![habit.0, week.to_string(), completed, new_streak],
        )?;
        tx.commit()?;

        Ok(CompletionRecord {
            habit_id: habit,
            week_key: week,
            completed,
            streak: new_streak,
        })
    }
}
