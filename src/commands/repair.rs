//! Repair command - brings data directory ownership in line with the identity.

use anyhow::Result;

use crate::config::Config;
use crate::ownership::{self, RepairOutcome};

/// Execute the ownership repair step.
///
/// Runs before every mode; `force` is set when `repair` itself was requested.
pub fn cmd_repair(config: &Config, force: bool) -> Result<RepairOutcome> {
    let outcome = ownership::repair(&config.data_dir, &config.identity, force)?;
    if force {
        match &outcome {
            RepairOutcome::Repaired { changed, .. } if *changed == 0 => {
                eprintln!("Ownership of {} already correct.", config.data_dir.display());
            }
            RepairOutcome::Repaired { changed, .. } => {
                eprintln!("Repaired ownership of {} entries.", changed);
            }
            RepairOutcome::Skipped => {}
        }
    }
    Ok(outcome)
}
