//! Parsing and validation of `loom.toml` elaboration configuration.
//!
//! This crate reads the optional configuration file and produces a
//! strongly-typed [`ElabConfig`] controlling the finalization fixpoint cap,
//! identifier generation, and domain naming.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
