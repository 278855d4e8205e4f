//! Settings command handler.

use anyhow::Result;
use scry_core::Settings;

/// Print the effective settings, or only confirm they are valid.
///
/// Validation already happened while loading.
pub fn execute(settings: &Settings, check: bool) -> Result<()> {
    if check {
        eprintln!("Settings are valid");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
