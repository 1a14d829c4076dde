use clap::Subcommand;
use habitroom_core::{GroupHabit, GroupId, HabitStore, UserId};
use serde::Serialize;

use super::context::Context;
use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum GroupAction {
    /// List groups in creation order with members and habits
    List,
}

#[derive(Serialize)]
struct GroupView {
    id: GroupId,
    name: String,
    members: Vec<UserId>,
    habits: Vec<GroupHabit>,
}

pub fn run(action: GroupAction) -> CmdResult {
    let ctx = Context::open()?;
    match action {
        GroupAction::List => {
            let names = ctx.gateway.containers();
            let mut views = Vec::new();
            for group in ctx.store.list_groups()? {
                let name = names
                    .iter()
                    .find(|(id, _)| *id == group.id)
                    .map(|(_, name)| name.clone())
                    .unwrap_or_default();
                views.push(GroupView {
                    id: group.id,
                    name,
                    members: group.members().collect(),
                    habits: ctx.store.get_habits_in_group(group.id)?,
                });
            }
            print_json(&views)?;
        }
    }
    Ok(())
}
