use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Available appy subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP/HTTPS server with the web dev server in watch mode
    ///
    /// Starts the front-end dev server, waits for its first successful
    /// compile, then runs the API process and restarts it whenever a watched
    /// file changes.
    Start(StartArgs),
}

/// Arguments for the start command
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Project root (defaults to the current directory)
    ///
    /// Watch paths, `appy.toml`, `package.json` and the SSL certificate
    /// directory are all resolved relative to this directory.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Do not start the web dev server even if package.json exists
    ///
    /// The API process is started immediately instead of waiting for the
    /// first front-end compile.
    #[arg(long)]
    pub no_web: bool,
}
