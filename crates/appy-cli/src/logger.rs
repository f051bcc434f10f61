//! Logging infrastructure for the appy CLI.
//!
//! Diagnostics go through `tracing`; the lifecycle lines users watch for
//! (compiling, compiled, failed) go through [`crate::ui`].
//!
//! # Example
//!
//! ```rust,no_run
//! use appy_cli::logger::init_logger;
//! use tracing::debug;
//!
//! init_logger(false, false, false);
//! debug!("watching {} paths", 8);
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERBOSE_FILTER: &str = "appy_cli=debug,appy_config=debug";
const QUIET_FILTER: &str = "appy_cli=error,appy_config=error";
const DEFAULT_FILTER: &str = "appy_cli=info,appy_config=info";

/// Initialize the tracing subscriber.
///
/// The level is chosen in this order:
/// 1. `--verbose`: DEBUG for appy crates
/// 2. `--quiet`: ERROR only
/// 3. `RUST_LOG` environment variable
/// 4. INFO for appy crates
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let filter = filter_for(verbose, quiet);

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    // try_init: tests may have installed a subscriber already
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
