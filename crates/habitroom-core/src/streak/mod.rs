//! Week keys and the streak engine.

pub mod engine;
pub mod week;

pub use engine::{next_streak, StreakEngine};
pub use week::{last_iso_week, previous_week_key, WeekKey};
