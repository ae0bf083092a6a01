//! gpio_tally - input counting daemon
//!
//! Counts transitions on the enabled inputs and appends the per-channel
//! deltas to the counter ledger every flush interval.
//!
//! Usage:
//!   gpio_tally < samples.txt
//!   INPUT_SOURCE=/path/to/samples.txt gpio_tally
//!
//! Environment variables:
//!   COUNTER_INPUTS - Enabled pins, comma-separated (required)
//!   STORE_HOST / STORE_USER / STORE_PASSWORD / STORE_DB - Store access (required)
//!   FLUSH_INTERVAL_SECS - Flush interval (default: 60)
//!   EDGE_MODE - both | rising | baseline (default: both)
//!   SKIP_ZERO_DELTAS - Skip zero writes (default: false)
//!   WATCH_TIMEOUT_MS - Interrupt wait timeout, 0 = forever (default: 1000)
//!   INPUT_SOURCE - `-` for stdin or a file of samples (default: -)

use dotenv::dotenv;
use gpio_tally::config::{CounterConfig, InputConfig};
use gpio_tally::counter::SqliteCounterStore;
use gpio_tally::daemon::{Daemon, StartupError};
use gpio_tally::hardware::{replay::spawn_line_feed, ScriptedInputs};
use gpio_tally::shutdown::{listen_for_signals, Shutdown};
use log::{error, info};
use std::fs::File;
use std::io::{self, BufReader};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Starting gpio_tally v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {}", e);
            eprintln!("Error : {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, StartupError> {
    let config = CounterConfig::from_env()?;

    let channels: Vec<String> = config.channels.iter().map(|c| c.to_string()).collect();
    info!("📊 Configuration:");
    info!("   ├─ Counters: [{}]", channels.join(", "));
    info!(
        "   ├─ Store: {}@{} ({})",
        config.store.user, config.store.host, config.store.database
    );
    info!("   ├─ Flush interval: {}s", config.flush_interval.as_secs());
    info!("   ├─ Edge mode: {}", config.edge_mode);
    info!("   ├─ Zero deltas: {}", if config.skip_zero_deltas { "skipped" } else { "written" });
    match config.watch_timeout {
        Some(timeout) => info!("   └─ Watch timeout: {}ms", timeout.as_millis()),
        None => info!("   └─ Watch timeout: none"),
    }

    let source = open_input(&config.input)?;

    let shutdown = Shutdown::new();
    listen_for_signals(shutdown.clone())
        .map_err(|e| StartupError::Io("create signals handler".to_string(), e))?;
    info!("🔄 Press CTRL+C to shutdown gracefully");

    let store = Arc::new(SqliteCounterStore::new(&config.store));
    let daemon = Daemon::new(config, store);
    let outcome = daemon.run(source, shutdown).await?;

    info!(
        "Stopped after {} flush cycles ({} events recorded)",
        outcome.reports.len(),
        outcome.reports.iter().map(|r| r.persisted_total()).sum::<u64>()
    );
    Ok(outcome.exit_code())
}

fn open_input(input: &InputConfig) -> Result<ScriptedInputs, StartupError> {
    let source = match input {
        InputConfig::Stdin => {
            info!("Reading input samples from stdin");
            spawn_line_feed("stdin", 0, BufReader::new(io::stdin()))
        }
        InputConfig::File(path) => {
            info!("Reading input samples from {}", path);
            let file = File::open(path)
                .map_err(|e| StartupError::Io(format!("open input {}", path), e))?;
            spawn_line_feed(path, 0, BufReader::new(file))
        }
    };
    source.map_err(|e| StartupError::Io("start input feed".to_string(), e))
}
