//! Cascade routing service.
//!
//! ```bash
//! # Route a single utterance
//! cascade-service --config cascade.toml route --tenant acme "hold please"
//!
//! # Serve JSONL requests on stdin, decisions on stdout
//! cascade-service --config cascade.toml serve
//!
//! # Validate the config and print a summary
//! cascade-service --config cascade.toml check
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{stdin, stdout, BufReader};
use tracing::info;

use cascade::types::{CallContext, TenantId};
use cascade_service::{build_router, jsonl, telemetry, ServiceConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config (provider, router, tenants)
    #[arg(long, short, default_value = "cascade.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Route one utterance and print the decision as JSON
    Route {
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value = "cli")]
        call_id: String,
        utterance: String,
    },
    /// Read JSONL requests from stdin until EOF
    Serve,
    /// Validate the config and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let config = ServiceConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command {
        Command::Check => {
            println!(
                "config ok: {} tenant(s), {} scenario(s), provider {}",
                config.routing.tenants.len(),
                config
                    .routing
                    .tenants
                    .iter()
                    .map(|t| t.scenarios.len())
                    .sum::<usize>(),
                config.provider.url
            );
        }
        Command::Route {
            tenant,
            call_id,
            utterance,
        } => {
            let router = build_router(&config).await?;
            let decision = router
                .route(&utterance, &TenantId::from(tenant.as_str()), CallContext::new(call_id, 0))
                .await
                .context("routing failed")?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            router.flush_learning().await.context("learning flush failed")?;
        }
        Command::Serve => {
            let router = build_router(&config).await?;
            info!(config = %cli.config.display(), "Serving JSONL on stdin");
            let stats = jsonl::serve(&router, BufReader::new(stdin()), stdout())
                .await
                .context("JSONL stream failed")?;
            router.flush_learning().await.context("learning flush failed")?;
            info!(requests = stats.requests, errors = stats.errors, "Input closed");
        }
    }
    Ok(())
}
