//! Stock Journal administrative CLI
//!
//! Projection rebuilds, scheduler ticks, and read-side inspection of the
//! position ledger.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use stock_journal::{
    analytics,
    config::Config,
    journal::JournalService,
    money::round_display,
    notify::HttpPushTransport,
    scheduler::{Scheduler, SystemClock},
    store::Database,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stock-journal")]
#[command(about = "Position-ledger engine for a personal stock-investment journal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild projections from the event log
    Recalculate {
        /// Restrict to a single entry
        #[arg(long)]
        entry: Option<i64>,
        /// Restrict to one owner's entries
        #[arg(long)]
        owner: Option<i64>,
    },
    /// Run one scheduler tick
    Tick {
        #[arg(long)]
        owner: Option<i64>,
    },
    /// Run the scheduler loop
    Run {
        #[arg(long)]
        owner: Option<i64>,
    },
    /// Show an entry's projected summary
    Summary { entry_id: i64 },
    /// Show an entry's state-after trail
    Trail { entry_id: i64 },
    /// Portfolio analytics as JSON
    Stats {
        #[arg(long)]
        owner: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Recalculate { entry, owner } => recalculate(config, entry, owner).await,
        Commands::Tick { owner } => tick(config, owner).await,
        Commands::Run { owner } => run_scheduler(config, owner).await,
        Commands::Summary { entry_id } => show_summary(config, entry_id).await,
        Commands::Trail { entry_id } => show_trail(config, entry_id).await,
        Commands::Stats { owner } => show_stats(config, owner).await,
    }
}

async fn recalculate(config: Config, entry: Option<i64>, owner: Option<i64>) -> anyhow::Result<()> {
    let db = Arc::new(Database::connect(&config.database.path).await?);
    let service = JournalService::new(db);

    match entry {
        Some(entry_id) => {
            service.recalculate_entry(entry_id).await?;
            println!("Rebuilt projection for entry {}", entry_id);
        }
        None => {
            let count = service.recalculate(owner).await?;
            println!("Rebuilt {} projections", count);
        }
    }
    Ok(())
}

async fn tick(config: Config, owner: Option<i64>) -> anyhow::Result<()> {
    let db = Arc::new(Database::connect(&config.database.path).await?);
    let transport = HttpPushTransport::new(Duration::from_secs(config.push.timeout_secs))?;
    let scheduler = Scheduler::new(db, transport, SystemClock, config.scheduler);

    let report = scheduler.tick(owner).await?;
    println!(
        "Tick: {} examined, {} delivered, {} skipped, {} retained",
        report.examined, report.delivered, report.skipped, report.retained
    );
    Ok(())
}

async fn run_scheduler(config: Config, owner: Option<i64>) -> anyhow::Result<()> {
    tracing::info!(
        interval_secs = config.scheduler.tick_interval_secs,
        "starting scheduler loop"
    );
    let db = Arc::new(Database::connect(&config.database.path).await?);
    let transport = HttpPushTransport::new(Duration::from_secs(config.push.timeout_secs))?;
    let scheduler = Scheduler::new(db, transport, SystemClock, config.scheduler);
    scheduler.run(owner).await?;
    Ok(())
}

async fn show_summary(config: Config, entry_id: i64) -> anyhow::Result<()> {
    let db = Arc::new(Database::connect(&config.database.path).await?);
    let service = JournalService::new(db);

    let entry = service.get_entry(entry_id).await?;
    let s = &entry.summary;

    println!("\n{} ({})\n", entry.symbol, entry.name);
    println!("{:<24} {:>16}", "Quantity", s.current_quantity.to_string());
    println!(
        "{:<24} {:>16}",
        "Average price",
        round_display(s.average_price).to_string()
    );
    println!(
        "{:<24} {:>16}",
        "Cost basis",
        round_display(s.total_cost).to_string()
    );
    println!(
        "{:<24} {:>16}",
        "Realized P&L",
        round_display(s.realized_profit).to_string()
    );
    println!(
        "{:<24} {:>16}",
        "Bought / sold",
        format!("{} / {}", s.total_bought_quantity, s.total_sold_quantity)
    );
    println!("{:<24} {:>16}", "Transactions", s.transaction_count);
    if let Some(first) = s.first_purchase_date {
        println!("{:<24} {:>16}", "First purchase", first.to_string());
    }
    if let Some(last) = s.last_transaction_date {
        println!("{:<24} {:>16}", "Last event", last.to_string());
    }
    Ok(())
}

async fn show_trail(config: Config, entry_id: i64) -> anyhow::Result<()> {
    let db = Arc::new(Database::connect(&config.database.path).await?);
    let service = JournalService::new(db);

    let trail = service.get_trail(entry_id).await?;
    println!(
        "\n{:<12} {:<6} {:>12} {:>12} {:>14} {:>14}",
        "Date", "Event", "Price", "Qty", "Holding", "Trade P&L"
    );
    println!("{}", "-".repeat(76));

    for record in &trail {
        match (&record.transaction, &record.split) {
            (Some(tx), _) => {
                println!(
                    "{:<12} {:<6} {:>12} {:>12} {:>14} {:>14}",
                    tx.trade_date.to_string(),
                    tx.side.to_string(),
                    round_display(tx.price).to_string(),
                    tx.quantity.to_string(),
                    record.holding_quantity.to_string(),
                    record
                        .realized_profit
                        .map(|p| round_display(p).to_string())
                        .unwrap_or_default()
                );
            }
            (None, Some(sp)) => {
                println!(
                    "{:<12} {:<6} {:>12} {:>12} {:>14} {:>14}",
                    sp.effective_date.to_string(),
                    "SPLIT",
                    format!("x{}", sp.ratio),
                    "",
                    record.holding_quantity.to_string(),
                    ""
                );
            }
            (None, None) => {}
        }
    }
    Ok(())
}

async fn show_stats(config: Config, owner: Option<i64>) -> anyhow::Result<()> {
    let db = Arc::new(Database::connect(&config.database.path).await?);
    let rows = db.load_analytics_rows(owner).await?;
    let report = analytics::portfolio_report(&rows);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
