//! Config command - configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Show the user configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Path => cmd_path(),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let config = &ctx.config;

    println!("# bot-team Configuration\n");
    println!("model:        {}", config.model());
    println!("max_tokens:   {}", config.max_tokens());
    println!("num_choices:  {}", config.num_choices());
    println!("temperature:  {}", config.temperature());
    println!("max_hops:     {}", config.max_hops());
    println!("log_level:    {}", config.log_level());
    println!("api_url:      {}", config.api_url());
    println!(
        "api_key:      {}",
        if config.api_key().is_some() { "set" } else { "not set" }
    );
    match &config.agents_dir {
        Some(dir) => println!("agents_dir:   {}", dir.display()),
        None => println!("agents_dir:   (not set)"),
    }
    match &config.pricing_file {
        Some(path) => println!("pricing_file: {}", path.display()),
        None => println!("pricing_file: (bundled)"),
    }

    if ctx.verbose {
        println!("\n---\nRaw config:\n");
        println!("{}", config.to_toml()?);
    }
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");
    for source in &ctx.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }
    Ok(())
}

fn cmd_path() -> Result<()> {
    match bot_team_config::xdg_config_path() {
        Some(path) => println!("{}", path.display()),
        None => println!("No user config directory available"),
    }
    Ok(())
}
