//! Tick loop driving the check session from the scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use super::{TickScheduler, TriggerKind};
use crate::session::CheckSession;
use crate::streak::WeekKey;

/// Wall-clock source for the tick loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Evaluate the scheduler at `now` and run whatever is due.
///
/// Each trigger runs in its own task so a failing or panicking round does
/// not take the loop down with it. The start task is not awaited: dispatch
/// can outlast the window, and the end trigger must still be able to close
/// it. An end due in the same tick waits for that tick's start. Returns the
/// triggers that fired.
pub async fn run_tick(
    scheduler: &mut TickScheduler,
    session: &Arc<CheckSession>,
    now: DateTime<Utc>,
) -> Vec<TriggerKind> {
    let due = scheduler.evaluate(now);
    let mut dispatch: Option<JoinHandle<()>> = None;
    for kind in &due {
        let session = Arc::clone(session);
        match kind {
            TriggerKind::StartRound => {
                let week = WeekKey::containing(&now.with_timezone(&scheduler.offset()));
                dispatch = Some(tokio::spawn(async move {
                    match session.begin_round(week).await {
                        Ok(report) => info!(
                            week = %week,
                            dispatched = report.dispatched,
                            skipped = report.skipped.len(),
                            "check round started"
                        ),
                        Err(e) => error!(week = %week, "failed to start check round: {e}"),
                    }
                }));
            }
            TriggerKind::EndRound => {
                if let Some(handle) = dispatch.take() {
                    log_abort(TriggerKind::StartRound, handle.await);
                }
                let handle = tokio::spawn(async move {
                    match session.end_round().await {
                        Ok(report) => info!(
                            week = %report.week_key,
                            forced = report.forced.len(),
                            failed = report.failed.len(),
                            "check round resolved"
                        ),
                        Err(e) => error!("failed to end check round: {e}"),
                    }
                });
                log_abort(TriggerKind::EndRound, handle.await);
            }
        }
    }
    if let Some(handle) = dispatch {
        tokio::spawn(async move { log_abort(TriggerKind::StartRound, handle.await) });
    }
    due
}

fn log_abort(kind: TriggerKind, joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(trigger = ?kind, "trigger task aborted: {e}");
    }
}

/// Tick forever at `every`. Ticks delayed past their slot are skipped.
pub async fn run_tick_loop(
    mut scheduler: TickScheduler,
    session: Arc<CheckSession>,
    clock: Arc<dyn Clock>,
    every: Duration,
) {
    info!(
        start = %scheduler.schedule().start,
        end = %scheduler.schedule().end,
        interval = ?every,
        "check scheduler started"
    );
    let mut interval = time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let now = clock.now();
        let fired = run_tick(&mut scheduler, &session, now).await;
        if !fired.is_empty() {
            debug!(?fired, %now, "tick fired triggers");
        }
    }
}
