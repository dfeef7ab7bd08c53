use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

use marketplace_payments::{
    commands::{
        settlements::{ProcessSettlementsCommand, RetryFailedSettlementsCommand},
        Command,
    },
    config::{self, AppConfig},
    db, events,
    gateway::HttpGatewayClient,
    services::{settlements::SettlementRunSummary, AppServices, ServiceFactory},
};

#[derive(Parser)]
#[command(
    name = "marketplace-payments",
    about = "Operator tool for marketplace payments and vendor settlement",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Print run summaries as JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Pay out every captured, unsettled vendor payment
    Settle {
        /// Keep running, one batch every N seconds (defaults to the configured interval)
        #[arg(long, num_args = 0..=1, default_missing_value = "0")]
        interval: Option<u64>,
    },
    /// Re-attempt payouts for settlements that previously failed
    RetrySettlements,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    let db_pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;

    let services = || -> Result<AppServices> {
        let (event_sender, event_rx) = events::channel(cfg.event_channel_capacity);
        tokio::spawn(events::process_events(event_rx));
        build_services(&cfg, db_pool.clone(), event_sender)
    };

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&db_pool).await?;
            info!("Migrations applied");
        }
        Commands::Settle { interval: None } => {
            let summary = ProcessSettlementsCommand.execute(&services()?).await?;
            report(&summary, cli.json)?;
        }
        Commands::Settle {
            interval: Some(secs),
        } => {
            let period = if secs == 0 {
                cfg.settlement_interval()
            } else {
                Duration::from_secs(secs)
            };
            run_settlement_loop(&services()?, period, cli.json).await?;
        }
        Commands::RetrySettlements => {
            let summary = RetryFailedSettlementsCommand.execute(&services()?).await?;
            report(&summary, cli.json)?;
        }
    }

    Ok(())
}

fn build_services(
    cfg: &AppConfig,
    db_pool: db::DbPool,
    event_sender: events::EventSender,
) -> Result<AppServices> {
    let base_url = cfg
        .gateway_base_url
        .clone()
        .ok_or_else(|| anyhow!("gateway_base_url must be configured to move money"))?;
    let client = Arc::new(HttpGatewayClient::new(
        base_url,
        cfg.gateway_api_key.clone(),
        cfg.gateway_timeout().max(cfg.payout_timeout()),
    )?);

    let factory = ServiceFactory::new(
        cfg.clone(),
        Arc::new(db_pool),
        client.clone(),
        client,
        event_sender,
    );
    Ok(AppServices::new(&factory))
}

async fn run_settlement_loop(services: &AppServices, period: Duration, json: bool) -> Result<()> {
    info!(?period, "Starting settlement scheduler");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match ProcessSettlementsCommand.execute(services).await {
                    Ok(summary) => report(&summary, json)?,
                    Err(e) => error!(error = %e, "Settlement run aborted"),
                }
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received, stopping settlement scheduler");
                return Ok(());
            }
        }
    }
}

fn report(summary: &SettlementRunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!(
            "selected={} processed={} failed={} skipped={} errors={}",
            summary.selected, summary.processed, summary.failed, summary.skipped, summary.errors
        );
    }
    Ok(())
}
