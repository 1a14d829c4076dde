use clap::Subcommand;
use habitroom_core::streak::previous_week_key;
use habitroom_core::Config;

use super::CmdResult;

#[derive(Subcommand)]
pub enum WeekAction {
    /// Print the current week key in the configured check offset
    Current,
    /// Print the week key before the given one
    Previous {
        /// Week key (YYYY-Www)
        key: String,
    },
}

pub fn run(action: WeekAction) -> CmdResult {
    match action {
        WeekAction::Current => {
            let config = Config::load_or_default();
            let offset = config.check_schedule()?.offset;
            let now = chrono::Utc::now().with_timezone(&offset);
            println!("{}", habitroom_core::WeekKey::containing(&now));
        }
        WeekAction::Previous { key } => {
            println!("{}", previous_week_key(&key)?);
        }
    }
    Ok(())
}
