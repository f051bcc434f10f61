//! `appy start`: run the development orchestrator.

use crate::cli::StartArgs;
use crate::dev::{CommandGenerator, Orchestrator};
use crate::error::{DevError, Result, ResultExt};
use crate::ui;
use appy_config::{ConfigDiscovery, DevConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const SSL_CERTS_MISSING: &str = "HTTP_SSL_ENABLED is set to true without SSL certs, please generate using `ssl:setup` first.";

/// Execute the start command.
///
/// Loads `appy.toml` from the project root, refuses to start on the first
/// configuration problem or on missing SSL certificates, then runs the
/// orchestrator until it is interrupted.
///
/// # Errors
///
/// Returns configuration errors before anything is started, and whatever
/// error stopped the orchestrator afterwards.
pub async fn execute(args: StartArgs) -> Result<()> {
    let root = resolve_root(args.cwd.as_deref())?;
    let config = load_config(&root)?;

    let web_enabled = !args.no_web && has_frontend(&root);
    if !web_enabled {
        tracing::info!("no web dev server, starting the API immediately");
    }

    let generator = Arc::new(CommandGenerator::from_settings(&config.generator, &root));
    Orchestrator::new(config, &root, generator)?
        .with_web(web_enabled)
        .run()
        .await?;

    ui::success("Stopped");
    Ok(())
}

fn resolve_root(cwd: Option<&Path>) -> Result<PathBuf> {
    let root = match cwd {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };

    let root = root.canonicalize().with_path(&root)?;
    if !root.is_dir() {
        return Err(DevError::InvalidArgument(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    Ok(root)
}

/// Load and check the configuration for `root`.
///
/// # Errors
///
/// Returns the first validation problem, or the missing-certificate error
/// when SSL is enabled without `cert.pem`/`key.pem`.
pub fn load_config(root: &Path) -> Result<DevConfig> {
    let config = ConfigDiscovery::new(root).load()?;

    if let Err(err) = config.validate() {
        return Err(DevError::Custom(err.first_message()));
    }

    if config.http.ssl_enabled && !config.http.ssl_certs_exist(root) {
        return Err(DevError::Custom(SSL_CERTS_MISSING.to_string()));
    }

    Ok(config)
}

fn has_frontend(root: &Path) -> bool {
    root.join("package.json").exists()
}
