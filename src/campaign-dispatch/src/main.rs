//! Campaign Dispatch: runs campaign executions against an in-memory workspace.

mod seed;

use campaign_core::config::AppConfig;
use campaign_orchestrator::CampaignStore;
use chrono::Utc;
use clap::{Parser, Subcommand};
use seed::Workspace;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "campaign-dispatch")]
#[command(about = "Multi-channel campaign message dispatch engine")]
#[command(version)]
struct Cli {
    /// TOML config file (environment variables override it)
    #[arg(long, env = "CAMPAIGN_DISPATCH_CONFIG")]
    config: Option<String>,

    /// Send attempts per message (overrides config)
    #[arg(long, env = "CAMPAIGN_DISPATCH__DELIVERY__MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Run one delivery worker per channel (overrides config)
    #[arg(long)]
    parallel_channels: Option<bool>,

    /// Provider call timeout in milliseconds (overrides config)
    #[arg(long, env = "CAMPAIGN_DISPATCH__DELIVERY__PROVIDER_TIMEOUT_MS")]
    provider_timeout_ms: Option<u64>,

    /// Log filter, e.g. "campaign_orchestrator=debug"
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute one demo campaign end to end
    Sample {
        /// Use real provider transports instead of dry-run ones
        #[arg(long, default_value_t = false)]
        live: bool,
    },
    /// Execute every demo campaign whose scheduled time has passed
    DispatchDue {
        /// Campaigns to run per owner
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Also run campaigns still in draft
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            cli.log_level.as_deref().unwrap_or(
                "campaign_dispatch=info,campaign_orchestrator=info,campaign_channels=info",
            ),
        ))
        .json()
        .init();

    let mut config = AppConfig::load_from(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(max_attempts) = cli.max_attempts {
        config.delivery.max_attempts = max_attempts;
    }
    if let Some(parallel) = cli.parallel_channels {
        config.delivery.parallel_channels = parallel;
    }
    if let Some(timeout_ms) = cli.provider_timeout_ms {
        config.delivery.provider_timeout_ms = timeout_ms;
    }

    info!(
        node_id = %config.node_id,
        max_attempts = config.delivery.max_attempts,
        parallel_channels = config.delivery.parallel_channels,
        "Configuration loaded"
    );

    match cli.command {
        Command::Sample { live } => {
            let workspace = Workspace::new(&config, live);
            let campaign = workspace.add_campaign("Trail Season", "Trail Runner 2", 5);
            let summary = workspace.pipeline.execute(campaign.id, true, None).await?;
            let stored = workspace
                .store
                .get_campaign(campaign.id)
                .ok_or_else(|| anyhow::anyhow!("campaign {} vanished", campaign.id))?;

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "campaign_id": campaign.id,
                    "status": stored.status,
                    "winning_variant": stored.winning_variant,
                    "metrics": stored.metrics,
                    "summary": summary,
                    "log_entries": workspace.store.logs_for_campaign(campaign.id).len(),
                }))?
            );
        }
        Command::DispatchDue { limit, force } => {
            let workspace = Workspace::new(&config, false);
            workspace.add_campaign("Trail Season", "Trail Runner 2", 90);
            workspace.add_campaign("Summer Miles", "Hydration Vest", 10);
            workspace.add_campaign("Autumn Teaser", "Storm Shell", -60);

            let report = workspace.runner().run(Utc::now(), limit, force).await;
            info!(
                executed = report.executed.len(),
                skipped = report.skipped.len(),
                "Due campaigns processed"
            );
            for (id, summary) in &report.executed {
                println!("{id} {}", serde_json::to_string(summary)?);
            }
            for (id, reason) in &report.skipped {
                println!("{id} skipped: {reason}");
            }
        }
    }

    Ok(())
}
