//! # Habitroom Core Library
//!
//! Business logic for a weekly habit-accountability bot. Users declare habits,
//! habits are placed into shared tracking groups of eight, and once a week
//! every tracked user is asked whether they kept their habit. Answers feed a
//! per-habit streak of consecutive completed weeks.
//!
//! The chat platform is reached only through the [`MessagingGateway`] trait;
//! the CLI binary drives the same library with an in-process gateway.
//!
//! ## Architecture
//!
//! - **Allocation**: first-fit placement of habits into bounded groups
//! - **Streaks**: week keys (`YYYY-Www`) and the streak rules over them
//! - **Check session**: the weekly round state machine, resolving each prompt
//!   exactly once
//! - **Scheduler**: tick-evaluated weekly triggers opening and closing rounds
//! - **Storage**: SQLite store and TOML configuration
//!
//! ## Key Components
//!
//! - [`ChannelAllocator`]: group placement
//! - [`StreakEngine`]: streak updates through the store
//! - [`CheckSession`]: weekly round
//! - [`Database`]: [`HabitStore`] persistence
//! - [`Config`]: Application configuration management

pub mod allocator;
pub mod backup;
pub mod declaration;
pub mod error;
pub mod gateway;
pub mod model;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod streak;

pub use allocator::ChannelAllocator;
pub use backup::BackupDir;
pub use declaration::{DeclarationService, HabitSummary};
pub use error::{
    AllocationError, ConfigError, CoreError, DatabaseError, GatewayError, SessionError,
    ValidationError,
};
pub use gateway::{HabitPrompt, LocalGateway, Member, MessageHandle, MessagingGateway};
pub use model::{
    CompletionRecord, Group, GroupHabit, GroupId, Habit, HabitDraft, HabitId, User, UserId,
    GROUP_CAPACITY,
};
pub use scheduler::{CheckSchedule, TickScheduler, TriggerKind, WeeklyTrigger};
pub use session::{
    CheckSession, DispatchReport, PromptResponse, ResolutionReport, ResponseOutcome,
    SessionPhase,
};
pub use storage::{Config, Database, HabitStore};
pub use streak::{StreakEngine, WeekKey};
