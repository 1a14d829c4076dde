use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "habitroom-cli", version, about = "Habitroom CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Habit declaration management
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Tracking group inspection
    Group {
        #[command(subcommand)]
        action: commands::group::GroupAction,
    },
    /// Record a weekly completion by hand
    Record(commands::record::RecordArgs),
    /// Week key helpers
    Week {
        #[command(subcommand)]
        action: commands::week::WeekAction,
    },
    /// Run one check round now, answering prompts on the console
    Round(commands::round::RoundArgs),
    /// Run the weekly check scheduler until interrupted
    Run,
    /// Database snapshots
    Backup {
        #[command(subcommand)]
        action: commands::backup::BackupAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("HABITROOM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Habit { action } => commands::habit::run(action).await,
        Commands::Group { action } => commands::group::run(action),
        Commands::Record(args) => commands::record::run(args),
        Commands::Week { action } => commands::week::run(action),
        Commands::Round(args) => commands::round::run(args).await,
        Commands::Run => commands::daemon::run().await,
        Commands::Backup { action } => commands::backup::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
