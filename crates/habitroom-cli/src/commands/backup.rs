use chrono::Utc;
use clap::Subcommand;
use habitroom_core::{BackupDir, Config, Database};
use serde_json::json;

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum BackupAction {
    /// Write a snapshot of the database now
    Snapshot,
    /// List snapshots, oldest first
    List,
    /// Restore the newest snapshot if the database file is missing
    Restore,
}

pub fn run(action: BackupAction) -> CmdResult {
    let config = Config::load()?;
    let backups = BackupDir::new(config.backup_dir()?, config.backup.base_name.clone());
    let db_path = config.database_path()?;

    match action {
        BackupAction::Snapshot => {
            let db = Database::open(&db_path)?;
            let path = backups.snapshot(&db, Utc::now())?;
            print_json(&json!({ "snapshot": path }))?;
        }
        BackupAction::List => {
            let snapshots: Vec<_> = backups
                .list()?
                .into_iter()
                .map(|(at, path)| json!({ "taken_at": at, "path": path }))
                .collect();
            print_json(&snapshots)?;
        }
        BackupAction::Restore => match backups.restore_latest(&db_path)? {
            Some(from) => print_json(&json!({ "restored_from": from, "database": db_path }))?,
            None => println!("nothing to restore"),
        },
    }
    Ok(())
}
