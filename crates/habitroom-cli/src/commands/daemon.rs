//! `run`: the weekly check scheduler as a foreground process.
//!
//! Prompts are answered on stdin as `<habit_id> y|n`.

use std::sync::Arc;
use std::time::Duration;

use habitroom_core::backup::{run_backup_loop, BackupDir};
use habitroom_core::scheduler::{run_tick_loop, SystemClock};
use habitroom_core::{CheckSession, HabitId, LocalGateway, TickScheduler};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::context::Context;
use super::round::{parse_answer, response_for};
use super::{print_json, CmdResult};

pub async fn run() -> CmdResult {
    let ctx = Context::open()?;
    let scheduler = TickScheduler::new(ctx.config.check_schedule()?);
    let session = Arc::new(CheckSession::new(ctx.store.clone(), ctx.gateway.clone()));
    let every = Duration::from_secs(ctx.config.check.tick_interval_secs.max(1));

    let backups = if ctx.config.backup.enabled {
        Some((
            BackupDir::new(ctx.config.backup_dir()?, ctx.config.backup.base_name.clone()),
            Duration::from_secs(ctx.config.backup.interval_minutes.max(1) * 60),
        ))
    } else {
        None
    };
    let backup_loop = async {
        match backups {
            Some((dir, interval)) => run_backup_loop(ctx.store.clone(), dir, interval).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = run_tick_loop(scheduler, session.clone(), Arc::new(SystemClock), every) => {}
        _ = backup_loop => {}
        result = answer_from_console(&session, &ctx.gateway) => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupted, shutting down");
        }
    }
    Ok(())
}

/// Feed `<habit_id> y|n` lines from stdin to the session. Keeps waiting
/// after stdin closes so a detached process keeps running.
async fn answer_from_console(session: &CheckSession, gateway: &LocalGateway) -> CmdResult {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let (Some(id), Some(answer)) = (parts.next(), parts.next()) else {
            continue;
        };
        let (Ok(id), Some(completed)) = (id.parse::<i64>(), parse_answer(answer)) else {
            warn!(line = %line, "expected `<habit_id> y|n`");
            continue;
        };

        let Some(prompt) = gateway
            .open_prompts()
            .into_iter()
            .find(|p| p.prompt.habit_id == HabitId(id))
        else {
            warn!(habit_id = id, "no open prompt for habit");
            continue;
        };
        match session.handle_response(&response_for(&prompt, completed)).await {
            Ok(outcome) => print_json(&outcome)?,
            Err(e) => warn!(habit_id = id, "answer not recorded: {e}"),
        }
    }
    std::future::pending().await
}
