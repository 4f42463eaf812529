//! Trading coordinator CLI application.

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use tradehub_config::Settings;
use tradehub_monitor::setup_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    // CLI flags override the [log] section.
    let level = match cli.log_level {
        Some(level) => level.as_str(),
        None => settings.log.level.as_str(),
    };
    let json = cli.json_logs || settings.log.json;
    let _guard = setup_logging(level, json, settings.log.file.as_deref().map(Path::new));

    match cli.command {
        Commands::Portfolio(args) => cli::commands::portfolio::run(args, &settings).await,
        Commands::Market(args) => cli::commands::market::run(args, &settings).await,
        Commands::Trade(args) => cli::commands::trade::run(args, &settings).await,
        Commands::History(args) => cli::commands::history::run(args, &settings).await,
        Commands::Run(args) => cli::commands::run::run(args, &settings).await,
        Commands::ValidateConfig => {
            cli::commands::validate::run(&settings, cli.config.as_deref()).await
        }
    }
}
