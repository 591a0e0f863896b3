//! Run command - dispatch a conversation through a team.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use bot_team_agent::{Dispatch, PriceTable, UsageStats};
use bot_team_llm::RestGateway;

use super::{Context, TeamArgs};

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub team: TeamArgs,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let config = args.team.config(ctx)?;
    let gateway = Arc::new(RestGateway::from_config(&config)?);
    let pricing_file = config.pricing_file.clone();
    let mut runner = args.team.runner(gateway, config)?;

    tracing::info!(agent = %args.team.agent, "Running team");
    let result = runner
        .run_team(&args.team.agent, args.team.messages())
        .await?;

    print_result(&result, args.json)?;

    let usage = runner.usage_stats();
    print_usage(usage);

    match PriceTable::discover(pricing_file.as_deref()) {
        Ok(prices) => match runner.total_cost(&prices) {
            Ok(cost) => println!("Total cost: ${:.6}", cost),
            Err(e) => eprintln!("Cost unavailable: {}", e),
        },
        Err(e) => {
            tracing::warn!(error = %e, "No price table, skipping cost");
        }
    }

    Ok(())
}

fn print_result(result: &Dispatch, json: bool) -> Result<()> {
    if json {
        let value = result.clone().into_value().unwrap_or(serde_json::Value::Null);
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match result {
        Dispatch::Nothing => println!("(no result)"),
        other => println!("{}", other),
    }
    Ok(())
}

fn print_usage(usage: &UsageStats) {
    if usage.is_empty() {
        println!("\nUsage: none reported");
        return;
    }

    println!("\nUsage:");
    println!(
        "  {:<24} {:<10} {:>10} {:>10} {:>10} {:>10}",
        "model", "tier", "input", "cached", "output", "total"
    );
    for (key, counts) in usage.iter() {
        println!(
            "  {:<24} {:<10} {:>10} {:>10} {:>10} {:>10}",
            key.model, key.tier, counts.input, counts.input_cached, counts.output, counts.total
        );
    }
}
