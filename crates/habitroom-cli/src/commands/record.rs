use clap::Args;
use habitroom_core::{HabitId, StreakEngine, WeekKey};
use serde_json::json;

use super::context::Context;
use super::{print_json, CmdResult};

#[derive(Args)]
pub struct RecordArgs {
    /// Habit id
    pub habit_id: i64,
    /// Week key (YYYY-Www); defaults to the current week
    #[arg(long)]
    pub week: Option<String>,
    /// Record the week as not completed
    #[arg(long)]
    pub missed: bool,
}

pub fn run(args: RecordArgs) -> CmdResult {
    let ctx = Context::open()?;
    let week = match &args.week {
        Some(key) => key.parse::<WeekKey>()?,
        None => ctx.current_week()?,
    };
    let engine = StreakEngine::new(ctx.store.clone());
    let streak = engine.update_streak(HabitId(args.habit_id), week, !args.missed)?;
    print_json(&json!({
        "habit_id": args.habit_id,
        "week_key": week,
        "completed": !args.missed,
        "streak": streak,
    }))
}
