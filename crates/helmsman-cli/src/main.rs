mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "helmsman")]
#[command(about = "Focus drift detection with voice interventions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a focus session, reading host events as JSON lines on stdin
    Watch {
        /// What this session is about
        #[arg(short, long)]
        goal: String,
        /// Locations considered relevant to the goal (repeatable)
        #[arg(short, long = "context")]
        contexts: Vec<String>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Watch { goal, contexts } => commands::watch::watch_command(goal, contexts).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show_command(),
            ConfigAction::Path => commands::config::path_command(),
        },
    }
}
