//! Database schema migrations for habitroom.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{info, warn};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    if current_version < SCHEMA_VERSION {
        info!(from = current_version, to = SCHEMA_VERSION, "database schema migrated");
    }
    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!("failed to read schema_version: {e}");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: users, tracking groups with their member slots, habits and
/// weekly completion records.
///
/// Slots are rows keyed by `(group_id, slot)` with `slot` in `0..8`; a user
/// appears at most once per group.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            user_id  INTEGER PRIMARY KEY,
            username TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tracking_groups (
            group_id    INTEGER PRIMARY KEY,
            created_seq INTEGER NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS group_slots (
            group_id INTEGER NOT NULL REFERENCES tracking_groups(group_id),
            slot     INTEGER NOT NULL CHECK (slot >= 0 AND slot < 8),
            user_id  INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            PRIMARY KEY (group_id, slot),
            UNIQUE (group_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS habits (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
            group_id      INTEGER REFERENCES tracking_groups(group_id),
            habit_name    TEXT NOT NULL,
            time_location TEXT NOT NULL DEFAULT '',
            identity      TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS completions (
            habit_id  INTEGER NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
            week_key  TEXT NOT NULL,
            completed INTEGER NOT NULL,
            streak    INTEGER NOT NULL DEFAULT 0 CHECK (streak >= 0),
            UNIQUE (habit_id, week_key)
        );",
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [1])?;
    tx.commit()
}

/// Migration v2: indexes for the per-group and per-user habit lookups used
/// by allocation and check rounds.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_habits_group_id ON habits(group_id);
         CREATE INDEX IF NOT EXISTS idx_habits_user_id ON habits(user_id);",
    )?;
    set_schema_version(conn, 2)
}
