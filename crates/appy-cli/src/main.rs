//! appy CLI entry point.

use appy_cli::{cli, commands, error, logger, ui};
use clap::Parser;
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);

    let result = match args.command {
        cli::Command::Start(start_args) => commands::start_execute(start_args).await,
    };

    result.map_err(error::dev_error_to_miette)
}
