//! FILENAME: app/summary-cli/src/logging.rs
// PURPOSE: Logging setup for the command-line tool.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// Installs the fmt subscriber on stderr so stdout stays pure JSON.
/// Records emitted through the `log` facade by the library crates are
/// forwarded to the same subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(e) = installed {
        eprintln!("[LOG_INIT] Logging already initialized: {}", e);
    }
}
