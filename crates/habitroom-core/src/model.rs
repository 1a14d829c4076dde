//! Persisted entities: users, habits, tracking groups and completion records.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::streak::WeekKey;

/// Maximum number of habits (and therefore member slots) in one tracking group.
pub const GROUP_CAPACITY: usize = 8;

/// Platform-scoped user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Habit row identifier, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(pub i64);

/// Tracking group identifier. Equal to the id of the platform container
/// hosting the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// User-editable fields of a habit declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitDraft {
    pub name: String,
    /// Free-text "when and where" cue.
    pub time_location: String,
    /// Free-text identity statement ("I am someone who...").
    pub identity: String,
}

impl HabitDraft {
    pub fn new(
        name: impl Into<String>,
        time_location: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            time_location: time_location.into(),
            identity: identity.into(),
        }
    }

    /// Trim fields and reject an empty habit name.
    pub fn validated(&self) -> Result<Self, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "name".into(),
                message: "habit name must not be empty".into(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            time_location: self.time_location.trim().to_string(),
            identity: self.identity.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub user_id: UserId,
    /// `None` only for rows written before allocation completed.
    pub group_id: Option<GroupId>,
    pub name: String,
    pub time_location: String,
    pub identity: String,
}

/// A tracking group: fixed, ordered member slots.
///
/// Slot occupancy mirrors habit membership: a user holds a slot exactly while
/// they own at least one habit in the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub slots: [Option<UserId>; GROUP_CAPACITY],
}

impl Group {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            slots: [None; GROUP_CAPACITY],
        }
    }

    pub fn members(&self) -> impl Iterator<Item = UserId> + '_ {
        self.slots.iter().flatten().copied()
    }

    pub fn slot_of(&self, user: UserId) -> Option<usize> {
        self.slots.iter().position(|s| *s == Some(user))
    }

    pub fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Row of `get_habits_in_group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupHabit {
    pub user_id: UserId,
    pub habit_id: HabitId,
    pub habit_name: String,
}

/// One week's answer for one habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub habit_id: HabitId,
    pub week_key: WeekKey,
    pub completed: bool,
    pub streak: u32,
}
