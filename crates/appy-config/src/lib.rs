//! Configuration for the appy development orchestrator.
//!
//! [`DevConfig`] describes the two supervised processes, the watched paths,
//! the live-reload endpoints and the schema generator. [`ConfigDiscovery`]
//! loads it from `appy.toml` and the environment; [`GeneratorConfig`] reads
//! the generator's own YAML file.

pub mod dev;
pub mod discovery;
pub mod error;
pub mod generator;

pub use dev::*;
pub use discovery::{ConfigDiscovery, CONFIG_FILE, ENV_PREFIX};
pub use error::*;
pub use generator::{GeneratorConfig, OutputFile};
