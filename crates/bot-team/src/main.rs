//! bot-team - run teams of chat completion agents
//!
//! Main entry point for the bot-team CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, request, run};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// bot-team - run teams of chat completion agents
#[derive(Parser)]
#[command(name = "bot-team")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of discovery
    #[arg(long, global = true, env = "BOT_TEAM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a team starting at an agent
    Run(run::RunArgs),

    /// Print the request the first agent would send
    Request(request::RequestArgs),

    /// Configuration inspection
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = commands::load_config(cli.config.as_deref())?;

    // Console (human-readable) + daily JSON file
    let console_filter = if cli.verbose {
        "bot_team=debug,bot_team_agent=debug,bot_team_llm=debug,bot_team_config=debug,info"
            .to_string()
    } else {
        let level = loaded.config.log_level();
        format!(
            "bot_team={level},bot_team_agent={level},bot_team_llm={level},bot_team_config={level},warn"
        )
    };

    let log_dir = bot_team_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "bot-team.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(console_filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "bot_team=trace,bot_team_agent=trace,bot_team_llm=trace,bot_team_config=trace,info",
                )),
        )
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        config: loaded.config,
        sources: loaded.sources,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Request(args) => request::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
