use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orm_core::{DimsePipeline, WorklistFilter};

mod config;

#[derive(Parser)]
#[command(name = "order-orm")]
#[command(about = "Forward scheduled worklist items to the order-management service")]
struct Cli {
    /// Scheduled procedure step start date (YYYYMMDD)
    start_date: String,
    /// Modality to match (e.g. CT)
    modality: String,
    /// Scheduled station AE title to match
    station_name: String,
    /// SQLite ledger file (overrides ORM_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,
    /// Retention window in days (overrides ORM_RETENTION_DAYS)
    #[arg(long)]
    retention_days: Option<i64>,
}

/// Main entry point for the order forwarder.
///
/// Runs the pipeline once for the given filter and prints a one-line summary.
///
/// # Environment Variables
/// - `ORM_WORKLIST_*` / `ORM_DESTINATION_*`: host, port, calling and called AE title of both
///   services
/// - `ORM_DB_PATH`: SQLite ledger file (default: "sent_orders.db")
/// - `ORM_RETENTION_DAYS`: retention window (default: 7)
/// - `ORM_NETWORK_TIMEOUT_SECS`: association read/write timeout (default: 30)
/// - `RUST_LOG`: log filter
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("run failed: {:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("order_orm=info".parse()?)
                .add_directive("orm_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let filter = WorklistFilter::new(&cli.start_date, &cli.modality, &cli.station_name)?;
    let cfg = config::resolve(
        |name| std::env::var(name).ok(),
        config::Overrides {
            db_path: cli.db,
            retention_days: cli.retention_days,
        },
    )?;

    tracing::info!(
        "++ Forwarding {} {} on {} (ledger: {})",
        filter.modality,
        filter.station_name,
        filter.start_date,
        cfg.db_path().display()
    );

    let report = DimsePipeline::from_config(&cfg).run(&filter).await?;
    Ok(report.to_string())
}
