//! Schema-triggered code generation.
//!
//! [`CodeGenTrigger`] is the first stop for every watch event. Schema edits
//! start the generator on a blocking task and never restart anything; files
//! the generator writes are recognised as echoes and dropped; everything else
//! is handed back to the dispatcher as a restart.

use crate::dev::{GenerationState, WatchEvent};
use crate::dev::watcher::Op;
use crate::error::{DevError, Result};
use crate::ui;
use appy_config::{GeneratorConfig, GeneratorSettings};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// The external schema-to-code generator.
pub trait SchemaGenerator: Send + Sync {
    /// Run one generation pass. Blocking.
    fn generate(&self, config: &GeneratorConfig) -> Result<()>;
}

/// Runs the generator as a child process, discarding its output unless it
/// fails.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    argv: Vec<String>,
    cwd: PathBuf,
}

impl CommandGenerator {
    pub fn new(argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            cwd: cwd.into(),
        }
    }

    pub fn from_settings(settings: &GeneratorSettings, root: &Path) -> Self {
        Self::new(settings.command.clone(), root)
    }
}

impl SchemaGenerator for CommandGenerator {
    fn generate(&self, config: &GeneratorConfig) -> Result<()> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| DevError::Generate("generator command is empty".to_string()))?;

        debug!(
            "running generator {} (exec: {}, model: {})",
            program, config.exec.filename, config.model.filename
        );

        let output = Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DevError::Generate(format!("failed to run `{}`: {}", program, e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("`{}` exited with {}", program, output.status)
        } else {
            stderr
        };
        Err(DevError::Generate(message))
    }
}

/// What the dispatcher should do with an event.
#[derive(Debug)]
pub enum Disposition {
    /// A generation is in flight; the event is dropped.
    Ignored,
    /// A generation was started on the returned task.
    Generating(JoinHandle<()>),
    /// The event was caused by the generator itself.
    Suppressed,
    /// Restart the API process.
    Restart,
}

pub struct CodeGenTrigger {
    state: Arc<GenerationState>,
    generator: Arc<dyn SchemaGenerator>,
    settings: GeneratorSettings,
    root: PathBuf,
}

impl CodeGenTrigger {
    pub fn new(
        state: Arc<GenerationState>,
        generator: Arc<dyn SchemaGenerator>,
        settings: GeneratorSettings,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            state,
            generator,
            settings,
            root: root.into(),
        }
    }

    pub fn state(&self) -> &Arc<GenerationState> {
        &self.state
    }

    fn config_path(&self) -> PathBuf {
        self.root.join(&self.settings.config_path)
    }

    fn is_schema(&self, event: &WatchEvent) -> bool {
        self.settings
            .schema_markers
            .iter()
            .any(|marker| event.path_contains(marker))
    }

    /// The generated models file is always an echo; the executable schema
    /// only when it is removed.
    // NOTE: editors that save through a rename never produce a Remove for
    // the exec file, so those echoes still restart.
    fn is_echo(&self, event: &WatchEvent) -> bool {
        let config = match GeneratorConfig::load(&self.config_path()) {
            Ok(config) => config,
            Err(err) => {
                debug!("generator config unavailable: {}", err);
                return false;
            }
        };

        event.path_contains(&config.model.filename)
            || (event.path_contains(&config.exec.filename) && event.op == Op::Remove)
    }

    /// Decide what to do with `event`. Must be called inside a tokio
    /// runtime; generation runs on a blocking task and is never cancelled.
    pub fn on_event(&self, event: &WatchEvent) -> Disposition {
        if self.state.is_generating() {
            return Disposition::Ignored;
        }

        if self.is_schema(event) {
            let Some(guard) = self.state.try_begin() else {
                return Disposition::Ignored;
            };

            ui::info("* Generating GraphQL boilerplate code...");

            let generator = Arc::clone(&self.generator);
            let config_path = self.config_path();
            let handle = tokio::task::spawn_blocking(move || {
                let _guard = guard;
                let result = GeneratorConfig::load(&config_path)
                    .map_err(DevError::from)
                    .and_then(|config| generator.generate(&config));
                if let Err(err) = result {
                    ui::info(&err.to_string());
                }
            });
            return Disposition::Generating(handle);
        }

        if self.is_echo(event) {
            debug!("suppressing generator echo {}", event.path.display());
            return Disposition::Suppressed;
        }

        Disposition::Restart
    }
}
