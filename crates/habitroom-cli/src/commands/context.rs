//! Shared setup: configuration, database and the console gateway.

use std::sync::Arc;

use chrono::Utc;
use habitroom_core::{BackupDir, Config, Database, HabitStore, LocalGateway, Member, WeekKey};
use tracing::debug;

pub struct Context {
    pub config: Config,
    pub store: Arc<Database>,
    pub gateway: Arc<LocalGateway>,
}

impl Context {
    /// Load config, restore the newest snapshot if the database file is gone,
    /// open the database and rebuild the gateway's view of groups and members.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Config::load()?;
        let db_path = config.database_path()?;
        if config.backup.enabled {
            BackupDir::new(config.backup_dir()?, config.backup.base_name.clone())
                .restore_latest(&db_path)?;
        }
        let store = Arc::new(Database::open(&db_path)?);

        let gateway = Arc::new(LocalGateway::new());
        for (n, group) in store.list_groups()?.iter().enumerate() {
            gateway.adopt_container(
                group.id,
                format!("{}-{}", config.groups.container_prefix, n + 1),
            );
            for entry in store.get_habits_in_group(group.id)? {
                if let Some(user) = store.get_user(entry.user_id)? {
                    gateway.register_member(Member {
                        id: user.id,
                        display_name: user.name,
                    });
                }
            }
        }
        debug!(path = %db_path.display(), "context ready");

        Ok(Self {
            config,
            store,
            gateway,
        })
    }

    /// Week key of the current moment in the configured check offset.
    pub fn current_week(&self) -> Result<WeekKey, Box<dyn std::error::Error>> {
        let offset = self.config.check_schedule()?.offset;
        Ok(WeekKey::containing(&Utc::now().with_timezone(&offset)))
    }
}
