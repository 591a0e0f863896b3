//! Request command - show what the first dispatch would send.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use bot_team_llm::{RestGateway, RestGatewayConfig};

use super::{Context, TeamArgs};

/// Arguments for the request command.
#[derive(Args, Debug)]
pub struct RequestArgs {
    #[command(flatten)]
    pub team: TeamArgs,
}

/// Run the request command.
pub async fn run(args: RequestArgs, ctx: &Context) -> Result<()> {
    let config = args.team.config(ctx)?;

    // Never called; building a request needs no credentials.
    let gateway = RestGateway::new(RestGatewayConfig::default().with_url(config.api_url()))?;
    let mut runner = args.team.runner(Arc::new(gateway), config)?;

    let request = runner.create_request(&args.team.agent, &args.team.messages())?;
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}
