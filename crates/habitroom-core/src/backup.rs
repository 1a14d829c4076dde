//! Timestamped database snapshots.
//!
//! Snapshots are named `{base}_{YYYY-MM-DD_HH-MM-SS}.db`. The newest one, by
//! the timestamp in its name, is restored when the database file is missing
//! at startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::error::CoreError;
use crate::storage::Database;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const TIMESTAMP_LEN: usize = 19;

pub fn timestamped_name(base_name: &str, at: DateTime<Utc>) -> String {
    format!("{base_name}_{}.db", at.format(TIMESTAMP_FORMAT))
}

/// Timestamp embedded in a snapshot file name of `base_name`.
pub fn extract_timestamp(base_name: &str, file_name: &str) -> Option<NaiveDateTime> {
    let stamp = file_name
        .strip_prefix(base_name)?
        .strip_prefix('_')?
        .strip_suffix(".db")?;
    if stamp.len() != TIMESTAMP_LEN {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

#[derive(Debug, Clone)]
pub struct BackupDir {
    dir: PathBuf,
    base_name: String,
}

impl BackupDir {
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_name: base_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot files with their timestamps, oldest first.
    pub fn list(&self) -> Result<Vec<(NaiveDateTime, PathBuf)>, CoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(stamp) = extract_timestamp(&self.base_name, &name.to_string_lossy()) {
                found.push((stamp, entry.path()));
            }
        }
        found.sort();
        Ok(found)
    }

    pub fn latest(&self) -> Result<Option<PathBuf>, CoreError> {
        Ok(self.list()?.pop().map(|(_, path)| path))
    }

    /// Write a snapshot of `db` stamped with `at`.
    pub fn snapshot(&self, db: &Database, at: DateTime<Utc>) -> Result<PathBuf, CoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(timestamped_name(&self.base_name, at));
        db.snapshot_to(&path)?;
        info!(path = %path.display(), "database snapshot written");
        Ok(path)
    }

    /// Copy the newest snapshot to `db_path` unless that file already exists.
    /// Returns the snapshot used.
    pub fn restore_latest(&self, db_path: &Path) -> Result<Option<PathBuf>, CoreError> {
        if db_path.exists() {
            return Ok(None);
        }
        let Some(latest) = self.latest()? else {
            return Ok(None);
        };
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&latest, db_path)?;
        info!(from = %latest.display(), to = %db_path.display(), "database restored from snapshot");
        Ok(Some(latest))
    }
}

/// Snapshot `db` every `every` until the task is dropped.
pub async fn run_backup_loop(db: Arc<Database>, backups: BackupDir, every: Duration) {
    info!(dir = %backups.dir().display(), interval = ?every, "backup loop started");
    let mut interval = time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; the database was just opened.
    interval.tick().await;

    loop {
        interval.tick().await;
        if let Err(e) = backups.snapshot(&db, Utc::now()) {
            error!("database snapshot failed: {e}");
        }
    }
}
