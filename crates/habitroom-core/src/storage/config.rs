//! TOML-based application configuration.
//!
//! Stores operator settings including:
//! - Weekly check window (start/end triggers, UTC offset, tick interval)
//! - Tracking group container naming
//! - Database backup schedule
//!
//! Configuration is stored at `~/.config/habitroom/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::{ConfigError, ValidationError};
use crate::scheduler::{parse_weekday, CheckSchedule, WeeklyTrigger};

/// One weekly trigger, e.g. `saturday 12:00`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub weekday: String,
    pub hour: u32,
    pub minute: u32,
}

/// Weekly check window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Fixed offset the triggers are evaluated in, in hours east of UTC.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_start_trigger")]
    pub start: TriggerConfig,
    #[serde(default = "default_end_trigger")]
    pub end: TriggerConfig,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
}

/// Tracking group configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupsConfig {
    /// Platform containers are named `{container_prefix}-{n}`.
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,
}

/// Database backup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Directory snapshots are written to; defaults to `<data dir>/backups`.
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_backup_base_name")]
    pub base_name: String,
    #[serde(default = "default_backup_interval_minutes")]
    pub interval_minutes: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/habitroom/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub check: CheckConfig,
    #[serde(default)]
    pub groups: GroupsConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    /// Database file name inside the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

// Default functions
fn default_utc_offset_hours() -> i32 {
    3
}
fn default_start_trigger() -> TriggerConfig {
    TriggerConfig {
        weekday: "saturday".into(),
        hour: 12,
        minute: 0,
    }
}
fn default_end_trigger() -> TriggerConfig {
    TriggerConfig {
        weekday: "saturday".into(),
        hour: 23,
        minute: 59,
    }
}
fn default_tick_interval_secs() -> u64 {
    30
}
fn default_container_prefix() -> String {
    "habit-tracking".into()
}
fn default_backup_base_name() -> String {
    "habitroom".into()
}
fn default_backup_interval_minutes() -> u64 {
    10
}
fn default_database_file() -> String {
    "habitroom.db".into()
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset_hours(),
            start: default_start_trigger(),
            end: default_end_trigger(),
            tick_interval_secs: default_tick_interval_secs(),
        }
    }
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            container_prefix: default_container_prefix(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            base_name: default_backup_base_name(),
            interval_minutes: default_backup_interval_minutes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check: CheckConfig::default(),
            groups: GroupsConfig::default(),
            backup: BackupConfig::default(),
            database_file: default_database_file(),
        }
    }
}

impl TriggerConfig {
    fn to_trigger(&self) -> Result<WeeklyTrigger, ValidationError> {
        WeeklyTrigger::new(parse_weekday(&self.weekday)?, self.hour, self.minute)
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<i64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving. Returns error if key is
    /// unknown or the value does not fit the field.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }

    /// Set a config value by key and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Weekly check window built from the `check` section.
    ///
    /// # Errors
    /// Returns an error for an unknown weekday, a time outside the day, or
    /// an offset beyond ±23 hours.
    pub fn check_schedule(&self) -> Result<CheckSchedule, ValidationError> {
        let offset = chrono::FixedOffset::east_opt(self.check.utc_offset_hours * 3600).ok_or(
            ValidationError::InvalidValue {
                field: "check.utc_offset_hours".into(),
                message: format!("{} is not a valid offset", self.check.utc_offset_hours),
            },
        )?;
        Ok(CheckSchedule {
            offset,
            start: self.check.start.to_trigger()?,
            end: self.check.end.to_trigger()?,
        })
    }

    /// Database file inside the data directory.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join(&self.database_file))
    }

    /// Backup directory, `<data dir>/backups` unless configured.
    pub fn backup_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.backup.dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(data_dir()?.join("backups")),
        }
    }
}
