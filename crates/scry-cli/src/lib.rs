//! Scry command-line adapter.
//!
//! `main.rs` is the composition root; this library holds the parser, the
//! bootstrap that wires the runtime components, and the command handlers so
//! they can be tested without spawning the binary.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tempfile as _;

// Used by main.rs only
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;

// Re-export primary types for convenient access
pub use bootstrap::{CliConfig, CliContext, bootstrap, load_cli_settings};
pub use commands::Commands;
pub use error::CliError;
pub use parser::Cli;
