//! Takeout - bulk account export
//!
//! Exports the selected categories of an account over a takeout session into one
//! CSV or JSON file per category, plus media folders for photos and stories.
//!
//! # Usage
//!
//! ```bash
//! # Export everything from an account snapshot
//! takeout --snapshot account.json
//!
//! # Only contacts and saved messages, as JSON
//! takeout --snapshot account.json --category contacts --category saved-messages -f json
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Level, warn};

use takeout::cli::{CliInterface, ConsoleSink, render_summary};
use takeout::error::{Result, TakeoutError};
use takeout::export::{TakeoutCoordinator, TakeoutSummary};
use takeout::remote::{AccountSnapshot, SnapshotBackend};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or run the export
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand().await? {
        return Ok(());
    }

    cli.print_banner();

    let summary = run_export(&cli).await?;
    println!("{}", render_summary(&summary, cli.use_color()));

    if summary.cancelled {
        return Err(TakeoutError::Cancelled);
    }
    if !summary.succeeded() {
        return Err(TakeoutError::Generic(
            "One or more categories failed".to_string(),
        ));
    }
    Ok(())
}

/// Run the selected categories against the account snapshot
async fn run_export(cli: &CliInterface) -> Result<TakeoutSummary> {
    let snapshot = AccountSnapshot::from_file(cli.snapshot_path()?).await?;
    let mut backend = SnapshotBackend::new(snapshot);
    if let Some(ms) = cli.args().latency_ms {
        backend = backend.with_latency(Duration::from_millis(ms));
    }

    let categories = cli.selected_categories();
    let sink = Arc::new(ConsoleSink::new(
        &categories,
        cli.use_color(),
        cli.args().quiet,
    ));

    // Ctrl+C cancels every job; the session is then closed as unsuccessful
    let cancel_token = CancellationToken::new();
    let ctrl_c_handle = {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Interrupted, cancelling export");
                    token.cancel();
                }
                Err(err) => {
                    eprintln!("Failed to listen for Ctrl+C: {}", err);
                }
            }
        })
    };

    let coordinator = TakeoutCoordinator::new(
        Arc::new(backend),
        sink.clone(),
        cli.config().export.clone(),
    )
    .with_cancellation(cancel_token);

    let result = coordinator.execute(&categories).await;

    ctrl_c_handle.abort();
    sink.finish();
    result
}

/// Initialize logging system based on verbosity level
fn initialize_logging(cli: &CliInterface) {
    let level = if cli.args().very_verbose {
        Level::TRACE
    } else if cli.args().verbose {
        Level::DEBUG
    } else {
        cli.config().logging.level.to_tracing_level()
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
