//! Console-driven check round.

use clap::Args;
use habitroom_core::gateway::SentPrompt;
use habitroom_core::{CheckSession, PromptResponse, ResponseOutcome, WeekKey};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::context::Context;
use super::{print_json, CmdResult};

#[derive(Args)]
pub struct RoundArgs {
    /// Week key (YYYY-Www); defaults to the current week
    #[arg(long)]
    pub week: Option<String>,
}

#[derive(Serialize)]
struct Answer {
    habit_id: i64,
    user_id: u64,
    completed: bool,
    outcome: ResponseOutcome,
}

/// `y`/`yes` and `n`/`no`; anything else leaves the prompt unanswered.
pub(crate) fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

pub(crate) fn response_for(prompt: &SentPrompt, completed: bool) -> PromptResponse {
    PromptResponse {
        habit_id: prompt.prompt.habit_id,
        week_key: prompt.prompt.week_key,
        responder: prompt.member.id,
        completed,
        message: Some(prompt.handle.clone()),
    }
}

pub async fn run(args: RoundArgs) -> CmdResult {
    let ctx = Context::open()?;
    let week = match &args.week {
        Some(key) => key.parse::<WeekKey>()?,
        None => ctx.current_week()?,
    };
    let session = CheckSession::new(ctx.store.clone(), ctx.gateway.clone());
    let dispatch = session.begin_round(week).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stderr = tokio::io::stderr();
    let mut answers = Vec::new();
    for prompt in ctx.gateway.open_prompts() {
        let question = format!(
            "{}, did you keep \"{}\" in {}? [y/n, empty to skip] ",
            prompt.member.display_name, prompt.prompt.habit_name, prompt.prompt.week_key
        );
        stderr.write_all(question.as_bytes()).await?;
        stderr.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(completed) = parse_answer(&line) else {
            continue;
        };
        let outcome = session
            .handle_response(&response_for(&prompt, completed))
            .await?;
        answers.push(Answer {
            habit_id: prompt.prompt.habit_id.0,
            user_id: prompt.member.id.0,
            completed,
            outcome,
        });
    }

    let resolution = session.end_round().await?;
    print_json(&serde_json::json!({
        "dispatch": dispatch,
        "answers": answers,
        "resolution": resolution,
    }))
}
