//! Restore command - extracts the restore file into an empty data directory.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::EntrypointError;
use crate::process::{self, Cmd, Pipe};
use crate::stream;

/// True when `dir` has no entries. A missing directory counts as empty.
pub fn is_empty_dir(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(true);
    }
    let mut entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    Ok(entries.next().is_none())
}

/// Execute the restore command. Returns the restored tree's size.
pub async fn cmd_restore(config: &Config) -> Result<u64> {
    let source = &config.restore_file;
    if !source.is_file() {
        return Err(EntrypointError::RestoreMissing(source.clone()).into());
    }
    if !is_empty_dir(&config.data_dir)? {
        return Err(EntrypointError::DataDirNotEmpty(config.data_dir.clone()).into());
    }

    process::require("tar")?;
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

    let total = stream::file_size(source)?;
    eprintln!(
        "Restoring {} ({}) into {}",
        source.display(),
        stream::human_size(total),
        config.data_dir.display()
    );

    let reader = tokio::fs::File::open(source)
        .await
        .with_context(|| format!("Failed to open {}", source.display()))?;

    let mut child = Cmd::new("tar")
        .arg("-C")
        .arg_path(&config.data_dir)
        .args(["--numeric-owner", "-xpf", "-"])
        .spawn_piped(Pipe::Stdin)?;
    let stdin = child.stdin.take().context("tar stdin was not captured")?;

    let pumped = stream::pump(reader, stdin, Some(total), "restore")
        .await
        .map(|(bytes, stdin)| {
            // Close our end so tar sees EOF.
            drop(stdin);
            bytes
        });

    let status = child.wait().await.context("Failed to wait for tar")?;
    process::check_status("tar", status)?;
    pumped.with_context(|| format!("Failed to stream {}", source.display()))?;

    let restored = stream::tree_size(&config.data_dir)?;
    eprintln!(
        "Restore complete: {} now holds {}",
        config.data_dir.display(),
        stream::human_size(restored)
    );
    Ok(restored)
}
