use anyhow::Context;
use clap::{Parser, Subcommand};
use mwapi_fixtures::{CommandRegistry, FixtureContext};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Run MediaWiki fixture commands for browser tests
#[derive(Debug, Parser)]
#[command(name = "mwapi-fixture", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the registered fixture commands
    List,
    /// Run one fixture command and print its JSON result
    Run {
        /// Command name, e.g. `MwApi:CreateItem` or `CreateItem`
        name: String,
        /// JSON parameter object
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let ctx = FixtureContext::from_env().context("failed to load fixture configuration")?;
    let registry = CommandRegistry::new(Arc::new(ctx));

    match cli.command {
        Command::List => {
            for name in registry.names() {
                println!("{name}");
            }
        }
        Command::Run { name, params } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("--params must be valid JSON")?;
            let result = registry
                .invoke(&name, params)
                .await
                .with_context(|| format!("{name} failed"))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
