use anyhow::Result;
use clap::Parser;
use tracing::warn;

mod cli;
mod commands;
mod config;
mod env;

use cli::{Cli, Commands, FailedCommands};
use config::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relaygram=info".parse()?),
        )
        .init();

    // A missing .env is fine; the token may come from the real environment.
    if let Err(e) = env::load_dotenv_from_ancestors() {
        warn!(error = %e, "Ignoring unreadable .env file");
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => commands::cmd_init(&path),
        Commands::Run { deadline_secs } => {
            let config = load_config(&cli.config)?;
            let code = commands::cmd_run(config, deadline_secs).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Status => {
            let config = load_config(&cli.config)?;
            commands::cmd_status(config)
        }
        Commands::Failed { command } => {
            let config = load_config(&cli.config)?;
            match command {
                FailedCommands::List { limit } => commands::cmd_failed_list(config, limit),
                FailedCommands::Clear => commands::cmd_failed_clear(config),
            }
        }
    }
}
