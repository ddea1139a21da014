use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use soda_watcher::alerts;
use soda_watcher::config::LoggingConfig;
use soda_watcher::models::{Alert, Retailer, today};
use soda_watcher::notifier::{LogNotifier, Notifier};
use soda_watcher::retailers::build_adapters;
use soda_watcher::{AppConfig, AppError, CycleSummary, PriceStore, ScrapeCoordinator};

#[derive(Parser)]
#[command(name = "soda-watcher")]
#[command(about = "Per-litre soft drink price tracking for Coles, Woolworths and Amazon AU")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every enabled retailer once and record the results
    Run {
        /// Collect and print offers without writing to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Latest recorded offer per product and retailer
    Latest {
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        retailer: Option<Retailer>,
    },
    /// Price history for one product at one retailer
    History {
        #[arg(long)]
        product: String,
        #[arg(long)]
        retailer: Retailer,
        /// How many days back to look
        #[arg(long, default_value = "30")]
        days: u64,
    },
    /// Evaluate alert thresholds against the latest offers
    Alerts,
    /// Summary of the most recent cycle
    Status,
    /// Cheapest in-stock offers by price per litre
    Deals {
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Per-retailer price per litre figures for a day (defaults to today)
    Stats {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Serialize)]
struct RunOutput<'a> {
    summary: &'a CycleSummary,
    alerts: Vec<Alert>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _guard = init_tracing(&config.logging)?;

    match cli.command {
        Commands::Run { dry_run } => run(&config, dry_run).await?,
        Commands::Latest { product, retailer } => {
            let store = open_store(&config).await?;
            print_json(&store.latest(product.as_deref(), retailer).await?)?;
        }
        Commands::History { product, retailer, days } => {
            if config.catalog.get(&product).is_none() {
                return Err(AppError::UnknownProduct { product_id: product }.into());
            }
            let store = open_store(&config).await?;
            let to = today();
            let from = to.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
            print_json(&store.history(&product, retailer, from, to).await?)?;
        }
        Commands::Alerts => {
            let store = open_store(&config).await?;
            let latest = store.latest(None, None).await?;
            print_json(&alerts::evaluate(&latest, &config.catalog, &config.alerts.preferences()))?;
        }
        Commands::Status => {
            let store = open_store(&config).await?;
            print_json(&store.last_cycle().await?)?;
        }
        Commands::Deals { limit } => {
            let store = open_store(&config).await?;
            print_json(&store.best_deals(limit).await?)?;
        }
        Commands::Stats { date } => {
            let store = open_store(&config).await?;
            let date = date.unwrap_or_else(today);
            print_json(&store.retailer_stats(date).await?)?;
        }
    }

    Ok(())
}

async fn run(config: &AppConfig, dry_run: bool) -> Result<()> {
    let adapters = build_adapters(config).context("Failed to build retailer adapters")?;
    let coordinator = ScrapeCoordinator::new(adapters, config.catalog.clone());
    info!(retailers = config.enabled_retailers().count(), dry_run, "Starting Soda Watcher cycle");

    if dry_run {
        let report = tokio::select! {
            report = coordinator.collect() => report,
            _ = tokio::signal::ctrl_c() => return Err(AppError::Cancelled.into()),
        };
        return print_json(&report);
    }

    let store = open_store(config).await?;

    // Dropping the cycle future rolls back any open transaction.
    let report = tokio::select! {
        report = coordinator.run_cycle(&store) => report?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, nothing from this cycle was recorded");
            return Err(AppError::Cancelled.into());
        }
    };

    let latest = store.latest(None, None).await?;
    let alerts = alerts::evaluate(&latest, &config.catalog, &config.alerts.preferences());
    LogNotifier.notify(&alerts).await?;

    print_json(&RunOutput {
        summary: &report.summary,
        alerts,
    })
}

async fn open_store(config: &AppConfig) -> Result<PriceStore> {
    PriceStore::connect(&config.database)
        .await
        .with_context(|| format!("Failed to open price store at {}", config.database.url))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Stderr logging filtered by `RUST_LOG` (falling back to the configured
/// level), plus a daily rolling file when a log directory is configured.
fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;
    let stderr = fmt::layer().with_writer(std::io::stderr);

    match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            Ok(None)
        }
    }
}
