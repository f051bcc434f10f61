//! Command-line interface definition for appy.
//!
//! # Command Structure
//!
//! - `appy start` - Run the API and web dev server in watch mode

mod commands;

use clap::Parser;

pub use commands::{Command, StartArgs};

/// appy - development orchestrator for API + web dev server projects
#[derive(Parser, Debug)]
#[command(
    name = "appy",
    version,
    about = "Development orchestrator for appy projects",
    long_about = "appy keeps the API process and the front-end dev server running while you\n\
                  edit, regenerating GraphQL code on schema changes and reloading the browser\n\
                  after every API restart."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    ///
    /// Shows watch events, process spawns and kills, and live reload
    /// connections.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    ///
    /// Outputs plain text without ANSI color codes. Useful for logging to
    /// files or systems that don't support colored terminal output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
