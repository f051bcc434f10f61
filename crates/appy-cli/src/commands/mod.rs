//! Command implementations for the appy CLI.
//!
//! - [`start`] - Development orchestrator

pub mod start;

pub use start::execute as start_execute;
