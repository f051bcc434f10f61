//! appy CLI - development orchestrator for API + web dev server projects.
//!
//! `appy start` watches the project, regenerates GraphQL code when schema
//! files change, restarts the API process on every other change and tells
//! the browser to reload once the new process is up.
//!
//! # Architecture
//!
//! - [`error`] - Error types with actionable messages
//! - [`logger`] - Structured logging with tracing
//! - [`ui`] - Status lines on stderr
//! - [`dev`] - The orchestrator and its components
//! - `commands` - CLI command implementations
//!
//! # Example
//!
//! ```no_run
//! use appy_cli::dev::{CommandGenerator, Orchestrator};
//! use appy_config::DevConfig;
//! use std::sync::Arc;
//!
//! # async fn run() -> appy_cli::Result<()> {
//! let config = DevConfig::default();
//! let generator = Arc::new(CommandGenerator::from_settings(&config.generator, ".".as_ref()));
//! Orchestrator::new(config, ".", generator)?.run().await
//! # }
//! ```

pub mod cli;
pub mod commands;
pub mod dev;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{DevError, Result, ResultExt};
