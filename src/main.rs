// src/main.rs
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zone_watcher::config::{InstrumentsFile, ServiceConfig};
use zone_watcher::data::CsvReplayProvider;
use zone_watcher::notifications::{AlertDispatcher, CsvAlertJournal, LogAlertSink};
use zone_watcher::realtime::{MonitorSettings, ZoneMonitor};
use zone_watcher::zones::patterns::DetectorRegistry;

/// Watches configured instruments for accumulation ranges, supply/demand
/// zones and fair value gaps.
#[derive(Debug, Parser)]
#[command(name = "zone_watcher", version)]
struct Args {
    /// Instrument ids to watch (default: all configured)
    instruments: Vec<String>,

    /// Instruments file, overrides ZONE_CONFIG_FILE
    #[arg(long)]
    config: Option<PathBuf>,

    /// Candle CSV directory, overrides REPLAY_DATA_DIR
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Run a single cycle for every instrument and exit
    #[arg(long)]
    once: bool,
}

// Console plus daily rotating file under logs/
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all("logs")?;
    let file_appender = tracing_appender::rolling::daily("logs", "zone_watcher");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .with_level(true)
                .compact(),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_target(true)
                .with_level(true)
                .with_ansi(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        println!("Warning: Could not load .env file: {}", e);
    }

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .init();
    }

    let args = Args::parse();
    info!("🚀 Starting Zone Watcher...");

    let mut service = ServiceConfig::from_env();
    if let Some(path) = args.config {
        service.config_file = path;
    }
    if let Some(dir) = args.data_dir {
        service.replay_data_dir = dir;
    }

    let registry = DetectorRegistry::with_builtins();
    let file = InstrumentsFile::load_from_file(&service.config_file)?;
    file.validate(&registry)?;
    let instruments = file.select(&args.instruments)?;
    for instrument in &instruments {
        info!(
            "📈 Watching {} [{}] with {} detector(s)",
            instrument.display_name(),
            instrument.ticker,
            instrument.detectors.len()
        );
    }

    let mut dispatcher = AlertDispatcher::new().with_sink(Arc::new(LogAlertSink));
    if service.alert_journal_enabled {
        dispatcher.add_sink(Arc::new(CsvAlertJournal::new(&service.alert_journal_dir)));
    }
    info!("📢 Alert sinks: {:?}", dispatcher.sink_names());

    let provider = Arc::new(CsvReplayProvider::new(&service.replay_data_dir));
    let monitor = ZoneMonitor::new(
        instruments,
        &registry,
        provider,
        dispatcher,
        MonitorSettings::from(&service),
    )?;

    println!("==============================================");
    println!("  Zone Watcher");
    println!("  Instruments: {}", monitor.instrument_ids().join(", "));
    println!("  Interval:    {}s", service.eval_interval.as_secs());
    println!("==============================================");

    if args.once {
        for (id, result) in monitor.run_once(Utc::now()).await {
            match result {
                Ok(report) => info!(
                    "✅ {} cycle {}: {} tracked zone(s), {} alert(s)",
                    id,
                    report.cycle,
                    report.tracked.len(),
                    report.alerts.len()
                ),
                Err(e) => warn!("⚠️ {} cycle aborted: {}", id, e),
            }
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = monitor.spawn(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!("🛑 Shutdown requested, stopping monitors...");
    if shutdown_tx.send(true).is_err() {
        warn!("All monitor tasks already stopped");
    }
    for handle in handles {
        if let Err(e) = handle.await {
            error!("❌ Monitor task ended abnormally: {}", e);
        }
    }
    info!("👋 Zone Watcher stopped");
    Ok(())
}
