use clap::Subcommand;
use habitroom_core::{DeclarationService, GroupId, HabitDraft, HabitId, Member, UserId};

use super::context::Context;
use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum HabitAction {
    /// Declare a new habit; the user is registered on first use
    Declare {
        /// Platform user id
        #[arg(long)]
        user: u64,
        /// Display name of the user
        #[arg(long)]
        name: String,
        /// What the habit is
        habit: String,
        /// When and where
        #[arg(long, default_value = "")]
        when: String,
        /// Identity statement
        #[arg(long, default_value = "")]
        identity: String,
    },
    /// Change a habit's text, optionally moving it to another group
    Edit {
        id: i64,
        habit: String,
        #[arg(long, default_value = "")]
        when: String,
        #[arg(long, default_value = "")]
        identity: String,
        /// Move the habit into this group
        #[arg(long)]
        group: Option<u64>,
    },
    /// Delete a habit and its history
    Remove { id: i64 },
    /// List a user's habits with their streaks
    List {
        #[arg(long)]
        user: u64,
    },
}

pub async fn run(action: HabitAction) -> CmdResult {
    let ctx = Context::open()?;
    let service = DeclarationService::new(
        ctx.store.clone(),
        ctx.gateway.clone(),
        ctx.config.groups.container_prefix.clone(),
    );

    match action {
        HabitAction::Declare {
            user,
            name,
            habit,
            when,
            identity,
        } => {
            let member = Member {
                id: UserId(user),
                display_name: name,
            };
            let declared = service
                .declare(&member, &HabitDraft::new(habit, when, identity))
                .await?;
            print_json(&declared)?;
        }
        HabitAction::Edit {
            id,
            habit,
            when,
            identity,
            group,
        } => {
            let draft = HabitDraft::new(habit, when, identity);
            let updated = match group {
                Some(group) => service.reassign(HabitId(id), &draft, GroupId(group)).await?,
                None => service.edit(HabitId(id), &draft)?,
            };
            print_json(&updated)?;
        }
        HabitAction::Remove { id } => match service.remove(HabitId(id))? {
            Some(removed) => print_json(&removed)?,
            None => {
                eprintln!("habit not found: {id}");
                std::process::exit(1);
            }
        },
        HabitAction::List { user } => {
            print_json(&service.overview(UserId(user))?)?;
        }
    }
    Ok(())
}
