//! csvexport - streaming CSV export
//!
//! Exports JSON Lines data to CSV in fixed-size batches and delivers it to a
//! file, standard output or a named storage disk.
//!
//! # Usage
//!
//! ```bash
//! # Export to a file, capped at 500 rows, with a BOM for spreadsheet tools
//! csvexport export users.jsonl --output users.csv --row-cap 500 --bom
//!
//! # Stream to stdout
//! csvexport export users.jsonl --stdout --no-cap
//!
//! # Scaffold a new export source
//! csvexport make-export Reports/MonthlySales
//! ```

use tracing_subscriber::EnvFilter;

use csvexport::cli::CliInterface;
use csvexport::error::Result;

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
/// 1. Parse command-line arguments
/// 2. Load configuration
/// 3. Initialize logging
/// 4. Run the subcommand
///
/// # Returns
/// * `Result<()>` - Success or error
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    cli.run().await
}

/// Initialize logging system based on configuration and verbosity
///
/// `RUST_LOG` takes precedence over the configured level when set. Logs go to
/// stderr so that `--stdout` output stays clean.
///
/// # Arguments
/// * `cli` - CLI interface with the effective logging configuration
fn initialize_logging(cli: &CliInterface) {
    let logging = &cli.config().logging;
    let level = logging.level.to_tracing_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
