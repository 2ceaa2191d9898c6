//! Superuser check.

use anyhow::Result;
use nix::unistd::geteuid;

use crate::error::EntrypointError;

/// Returns true when running with an effective UID of 0.
pub fn is_root() -> bool {
    geteuid().is_root()
}

/// Fail with [`EntrypointError::NotRoot`] unless running as root.
pub fn require_root() -> Result<()> {
    if !is_root() {
        return Err(EntrypointError::NotRoot.into());
    }
    Ok(())
}
