//! Typed failures that map to the entrypoint's exit statuses.
//!
//! Everything else travels as a plain `anyhow::Error` and exits with 1.

use std::path::PathBuf;
use thiserror::Error;

/// Exit status for failures that carry no more specific code.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Error, Debug)]
pub enum EntrypointError {
    #[error("this container must be run as root")]
    NotRoot,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("archive directory {} does not exist, mount a volume there", .0.display())]
    ArchiveDirMissing(PathBuf),

    #[error("archive {} already exists, refusing to overwrite it", .0.display())]
    ArchiveExists(PathBuf),

    #[error("restore file {} does not exist, mount an archive there", .0.display())]
    RestoreMissing(PathBuf),

    #[error("data directory {} is not empty, refusing to restore into it", .0.display())]
    DataDirNotEmpty(PathBuf),
}

impl EntrypointError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotRoot | Self::Config(_) => 1,
            Self::ArchiveDirMissing(_) | Self::ArchiveExists(_) => 2,
            Self::RestoreMissing(_) => 3,
            Self::DataDirNotEmpty(_) => 4,
        }
    }
}

/// Pick the exit status for any error coming out of [`crate::run`].
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<EntrypointError>())
        .map(EntrypointError::exit_code)
        .unwrap_or(EXIT_FAILURE)
}
