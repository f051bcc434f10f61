//! Development orchestrator for `appy start`.
//!
//! Keeps the API process and the front-end dev server running while the
//! project changes underneath them:
//!
//! - [`FileWatcher`] polls the project and emits filtered change events
//! - [`CodeGenTrigger`] regenerates code when schema files change
//! - [`ProcessSupervisor`] restarts the API process (and owns the web one)
//! - [`LiveReloadServer`] tells connected browsers to reload
//! - [`ShutdownCoordinator`] stops all of it on a signal or fatal error

pub mod codegen;
pub mod filter;
pub mod livereload;
pub mod orchestrator;
pub mod output;
pub mod shutdown;
pub mod state;
pub mod supervisor;
pub mod watcher;

pub use codegen::{CodeGenTrigger, CommandGenerator, Disposition, SchemaGenerator};
pub use filter::PathFilter;
pub use livereload::{Endpoint, LiveReloadHub, LiveReloadServer, RELOAD_MESSAGE};
pub use orchestrator::Orchestrator;
pub use output::{OutputClassifier, OutputLine, WebpackClassifier};
pub use shutdown::{FailureReporter, ShutdownCoordinator, ShutdownReason};
pub use state::{GenerationGuard, GenerationState, ReadinessSignal};
pub use supervisor::{CommandSpec, ProcessHandle, ProcessSupervisor, Role, Spawned};
pub use watcher::{EventBuffer, FileWatcher, Op, WatchEvent, WatchMessage};
