//! Weekly check session.
//!
//! One round per check window: prompts go out at window start, each prompt is
//! resolved exactly once, either by its owner's answer or by the forced
//! "not completed" write when the window closes.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Dispatching -> AwaitingResponses -> Resolving -> Idle
//! ```
//!
//! The pending set is guarded by a synchronous mutex that is never held
//! across an await. A response and the window-end resolution race to remove
//! a descriptor; whichever removes it performs the write, the other skips it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, DatabaseError, SessionError};
use crate::gateway::{HabitPrompt, Member, MessageHandle, MessagingGateway};
use crate::model::{GroupId, HabitId, UserId};
use crate::storage::HabitStore;
use crate::streak::{StreakEngine, WeekKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Dispatching,
    AwaitingResponses,
    Resolving,
}

/// A prompt awaiting its answer. `message` is `None` when sending failed;
/// the habit is still resolved at window end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPrompt {
    pub habit_id: HabitId,
    pub user_id: UserId,
    pub group_id: GroupId,
    pub week_key: WeekKey,
    pub message: Option<MessageHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The owner could not be resolved on the platform.
    MemberNotFound,
    /// The group's habits could not be read.
    GroupUnavailable { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPrompt {
    pub group_id: GroupId,
    pub habit_id: Option<HabitId>,
    pub user_id: Option<UserId>,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub week_key: WeekKey,
    /// Prompts delivered.
    pub dispatched: usize,
    /// Prompts registered for resolution whose delivery failed.
    pub undelivered: usize,
    pub skipped: Vec<SkippedPrompt>,
}

/// An answer from a prompt's controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptResponse {
    pub habit_id: HabitId,
    pub week_key: WeekKey,
    pub responder: UserId,
    pub completed: bool,
    /// The message the answer came from, when the platform reports it.
    pub message: Option<MessageHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResponseOutcome {
    Recorded { streak: u32 },
    /// Someone other than the habit's owner pressed the control.
    NotOwner,
    /// The window closed and the prompt was already resolved as not completed.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub week_key: WeekKey,
    /// Habits written as not completed.
    pub forced: Vec<HabitId>,
    /// Habits whose forced write failed.
    pub failed: Vec<HabitId>,
}

#[derive(Debug)]
struct RoundState {
    phase: SessionPhase,
    round: u64,
    week_key: Option<WeekKey>,
    pending: Vec<PendingPrompt>,
    answered: HashSet<(HabitId, WeekKey)>,
    expired: HashSet<(HabitId, WeekKey)>,
}

enum Claim {
    Pending(PendingPrompt),
    Answered,
    Expired,
    Unknown,
}

pub struct CheckSession {
    store: Arc<dyn HabitStore>,
    gateway: Arc<dyn MessagingGateway>,
    streaks: StreakEngine,
    state: Mutex<RoundState>,
}

impl CheckSession {
    pub fn new(store: Arc<dyn HabitStore>, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self {
            streaks: StreakEngine::new(Arc::clone(&store)),
            store,
            gateway,
            state: Mutex::new(RoundState {
                phase: SessionPhase::Idle,
                round: 0,
                week_key: None,
                pending: Vec::new(),
                answered: HashSet::new(),
                expired: HashSet::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RoundState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> SessionPhase {
        self.state().phase
    }

    /// Week of the current or most recent round.
    pub fn week_key(&self) -> Option<WeekKey> {
        self.state().week_key
    }

    pub fn pending(&self) -> Vec<PendingPrompt> {
        self.state().pending.clone()
    }

    /// Send one prompt per (user, habit) pair in every group.
    ///
    /// Unresolvable owners are skipped. A failed send still registers the
    /// habit so the window end resolves it.
    ///
    /// # Errors
    /// [`SessionError::RoundInProgress`] unless the session is idle, or a
    /// store error when the groups cannot be listed.
    pub async fn begin_round(&self, week_key: WeekKey) -> Result<DispatchReport, SessionError> {
        let round = {
            let mut state = self.state();
            if state.phase != SessionPhase::Idle {
                return Err(SessionError::RoundInProgress {
                    week_key: state
                        .week_key
                        .map(|w| w.to_string())
                        .unwrap_or_default(),
                });
            }
            state.phase = SessionPhase::Dispatching;
            state.round += 1;
            state.week_key = Some(week_key);
            state.pending.clear();
            state.answered.clear();
            state.expired.clear();
            state.round
        };
        info!(week = %week_key, round, "dispatching weekly check");

        let groups = match self.store.list_groups() {
            Ok(groups) => groups,
            Err(e) => {
                self.state().phase = SessionPhase::Idle;
                return Err(e.into());
            }
        };

        let mut report = DispatchReport {
            week_key,
            dispatched: 0,
            undelivered: 0,
            skipped: Vec::new(),
        };
        // Prompts that finished sending after the window was closed.
        let mut late = Vec::new();

        'groups: for group in groups {
            let habits = match self.store.get_habits_in_group(group.id) {
                Ok(habits) => habits,
                Err(e) => {
                    warn!(group_id = %group.id, "skipping group: {e}");
                    report.skipped.push(SkippedPrompt {
                        group_id: group.id,
                        habit_id: None,
                        user_id: None,
                        reason: SkipReason::GroupUnavailable {
                            message: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            for entry in habits {
                if !self.is_dispatching(round) {
                    warn!(week = %week_key, "window closed during dispatch");
                    break 'groups;
                }
                let Some(member) = self.resolve_member(entry.user_id).await else {
                    report.skipped.push(SkippedPrompt {
                        group_id: group.id,
                        habit_id: Some(entry.habit_id),
                        user_id: Some(entry.user_id),
                        reason: SkipReason::MemberNotFound,
                    });
                    continue;
                };

                let prompt = HabitPrompt {
                    habit_id: entry.habit_id,
                    habit_name: entry.habit_name.clone(),
                    week_key,
                };
                let message = match self.gateway.send_prompt(group.id, &member, &prompt).await {
                    Ok(handle) => {
                        report.dispatched += 1;
                        Some(handle)
                    }
                    Err(e) => {
                        warn!(
                            group_id = %group.id,
                            habit_id = %entry.habit_id,
                            user_id = %entry.user_id,
                            "failed to send prompt: {e}"
                        );
                        report.undelivered += 1;
                        None
                    }
                };
                let descriptor = PendingPrompt {
                    habit_id: entry.habit_id,
                    user_id: entry.user_id,
                    group_id: group.id,
                    week_key,
                    message,
                };

                {
                    let mut state = self.state();
                    if state.round == round && state.phase == SessionPhase::Dispatching {
                        state.pending.push(descriptor);
                    } else {
                        state.expired.insert((descriptor.habit_id, week_key));
                        late.push(descriptor);
                    }
                }
            }
        }

        {
            let mut state = self.state();
            if state.round == round && state.phase == SessionPhase::Dispatching {
                state.phase = SessionPhase::AwaitingResponses;
            }
        }

        if !late.is_empty() {
            let mut resolution = ResolutionReport {
                week_key,
                forced: Vec::new(),
                failed: Vec::new(),
            };
            for descriptor in &late {
                self.force_resolve(descriptor, &mut resolution).await;
            }
        }

        info!(
            week = %week_key,
            dispatched = report.dispatched,
            undelivered = report.undelivered,
            skipped = report.skipped.len(),
            "dispatch finished"
        );
        Ok(report)
    }

    fn is_dispatching(&self, round: u64) -> bool {
        let state = self.state();
        state.round == round && state.phase == SessionPhase::Dispatching
    }

    async fn resolve_member(&self, user: UserId) -> Option<Member> {
        if let Some(member) = self.gateway.cached_member(user) {
            return Some(member);
        }
        match self.gateway.fetch_member(user).await {
            Ok(Some(member)) => Some(member),
            Ok(None) => {
                warn!(user_id = %user, "member not found, skipping prompt");
                None
            }
            Err(e) => {
                error!(user_id = %user, "member lookup failed: {e}");
                None
            }
        }
    }

    /// Apply an answer to a prompt.
    ///
    /// Only the habit's owner may answer. The first resolution of a prompt
    /// wins: an answer arriving after the window end resolved it, or one for
    /// a week older than the current round, is [`ResponseOutcome::Expired`].
    /// Answers to prompts this session does not
    /// know (e.g. sent before a restart) are recorded after the owner check.
    ///
    /// # Errors
    /// Store errors from the owner lookup or the streak write. A failed write
    /// leaves the prompt pending.
    pub async fn handle_response(
        &self,
        response: &PromptResponse,
    ) -> Result<ResponseOutcome, CoreError> {
        let key = (response.habit_id, response.week_key);
        let claim = {
            let mut state = self.state();
            let position = state
                .pending
                .iter()
                .position(|p| p.habit_id == response.habit_id && p.week_key == response.week_key);
            match position {
                Some(pos) if state.pending[pos].user_id != response.responder => {
                    return Ok(self.reject(response));
                }
                Some(pos) => {
                    let descriptor = state.pending.remove(pos);
                    state.answered.insert(key);
                    Claim::Pending(descriptor)
                }
                None if state.expired.contains(&key) => Claim::Expired,
                // Weeks before the current round were closed by their own window end.
                None if state
                    .week_key
                    .is_some_and(|current| response.week_key < current) =>
                {
                    Claim::Expired
                }
                None if state.answered.contains(&key) => Claim::Answered,
                None => Claim::Unknown,
            }
        };

        let handle = match claim {
            Claim::Expired => {
                info!(
                    habit_id = %response.habit_id,
                    week = %response.week_key,
                    "answer arrived after window end"
                );
                return Ok(ResponseOutcome::Expired);
            }
            Claim::Pending(descriptor) => {
                match self
                    .streaks
                    .update_streak(response.habit_id, response.week_key, response.completed)
                {
                    Ok(streak) => {
                        let handle = descriptor.message.or_else(|| response.message.clone());
                        self.disable(handle.as_ref()).await;
                        return Ok(ResponseOutcome::Recorded { streak });
                    }
                    Err(e) => {
                        let mut state = self.state();
                        state.answered.remove(&key);
                        state.pending.push(descriptor);
                        return Err(e.into());
                    }
                }
            }
            Claim::Answered | Claim::Unknown => response.message.clone(),
        };

        let habit = self
            .store
            .get_habit(response.habit_id)?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "habit",
                id: response.habit_id.to_string(),
            })?;
        if habit.user_id != response.responder {
            return Ok(self.reject(response));
        }
        let streak =
            self.streaks
                .update_streak(response.habit_id, response.week_key, response.completed)?;
        self.disable(handle.as_ref()).await;
        Ok(ResponseOutcome::Recorded { streak })
    }

    fn reject(&self, response: &PromptResponse) -> ResponseOutcome {
        debug!(
            habit_id = %response.habit_id,
            responder = %response.responder,
            "This button is not for you"
        );
        ResponseOutcome::NotOwner
    }

    async fn disable(&self, handle: Option<&MessageHandle>) {
        if let Some(handle) = handle {
            if let Err(e) = self.gateway.disable_prompt(handle).await {
                warn!(message_id = handle.message_id, "failed to disable prompt: {e}");
            }
        }
    }

    /// Close the window: every prompt still pending is recorded as not
    /// completed, then the session returns to idle.
    ///
    /// # Errors
    /// [`SessionError::NoActiveRound`] when no round is open.
    pub async fn end_round(&self) -> Result<ResolutionReport, SessionError> {
        let (week_key, pending) = {
            let mut state = self.state();
            if matches!(state.phase, SessionPhase::Idle | SessionPhase::Resolving) {
                return Err(SessionError::NoActiveRound);
            }
            let week_key = state.week_key.ok_or(SessionError::NoActiveRound)?;
            state.phase = SessionPhase::Resolving;
            let pending = std::mem::take(&mut state.pending);
            for descriptor in &pending {
                state.expired.insert((descriptor.habit_id, descriptor.week_key));
            }
            (week_key, pending)
        };
        info!(week = %week_key, pending = pending.len(), "resolving unanswered prompts");

        let mut report = ResolutionReport {
            week_key,
            forced: Vec::new(),
            failed: Vec::new(),
        };
        for descriptor in &pending {
            self.force_resolve(descriptor, &mut report).await;
        }

        self.state().phase = SessionPhase::Idle;
        Ok(report)
    }

    async fn force_resolve(&self, descriptor: &PendingPrompt, report: &mut ResolutionReport) {
        match self
            .streaks
            .update_streak(descriptor.habit_id, descriptor.week_key, false)
        {
            Ok(_) => report.forced.push(descriptor.habit_id),
            Err(e) => {
                error!(
                    habit_id = %descriptor.habit_id,
                    week = %descriptor.week_key,
                    "failed to record missed check: {e}"
                );
                report.failed.push(descriptor.habit_id);
            }
        }
        self.disable(descriptor.message.as_ref()).await;
    }
}
