//! Miette diagnostic conversion for CLI errors.

use super::DevError;
use miette::Report;

/// Convert a `DevError` into a miette report for the process exit.
pub fn dev_error_to_miette(err: DevError) -> Report {
    match err {
        DevError::Config(e) => miette::miette!("Configuration error: {}", e),
        DevError::Fatal(msg) => {
            miette::miette!(help = "The orchestrator stopped both processes before exiting", "{}", msg)
        }
        DevError::Spawn { role, command, source } => miette::miette!(
            help = "Check that the command is installed and on PATH",
            "Failed to start {} process `{}`: {}",
            role,
            command,
            source
        ),
        _ => miette::miette!("{}", err),
    }
}
