//! Command handlers.
//!
//! Handlers follow the canonical pattern:
//! - Signature: `pub async fn execute(ctx: &CliContext, ...) -> Result<()>`
//! - Thin wrappers that call the runtime components and format output
//!
//! stdout carries machine-readable output (JSON lines for `run`); logs go to
//! stderr.

pub mod input;
pub mod run;
pub mod settings;
pub mod status;
