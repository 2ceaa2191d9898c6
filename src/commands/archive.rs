//! Archive command - streams a tar of the data directory to the archive mount.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::EntrypointError;
use crate::process::{self, Cmd, Pipe};
use crate::stream;

/// Archive file name for a given day.
pub fn archive_file_name(date: NaiveDate) -> String {
    format!("yumsync_{}.tar", date.format("%Y%m%d"))
}

/// Destination of the archive written on `date`.
pub fn archive_path(archive_dir: &Path, date: NaiveDate) -> PathBuf {
    archive_dir.join(archive_file_name(date))
}

/// Execute the archive command for today.
pub async fn cmd_archive(config: &Config) -> Result<PathBuf> {
    archive_on(config, Local::now().date_naive()).await
}

/// Archive the data directory into the file for `date`.
pub async fn archive_on(config: &Config, date: NaiveDate) -> Result<PathBuf> {
    if !config.archive_dir.is_dir() {
        return Err(EntrypointError::ArchiveDirMissing(config.archive_dir.clone()).into());
    }

    let dest = archive_path(&config.archive_dir, date);
    if dest.exists() {
        return Err(EntrypointError::ArchiveExists(dest).into());
    }

    process::require("tar")?;
    let size = stream::tree_size(&config.data_dir)?;

    let file = match OpenOptions::new().write(true).create_new(true).open(&dest) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(EntrypointError::ArchiveExists(dest).into())
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to create {}", dest.display())),
    };

    eprintln!(
        "Archiving {} ({}) to {}",
        config.data_dir.display(),
        stream::human_size(size),
        dest.display()
    );

    if let Err(e) = write_archive(&config.data_dir, file, size).await {
        let _ = fs::remove_file(&dest);
        return Err(e);
    }

    let written = stream::file_size(&dest)?;
    eprintln!("Archive complete: {} ({})", dest.display(), stream::human_size(written));
    Ok(dest)
}

async fn write_archive(data_dir: &Path, file: fs::File, size: u64) -> Result<()> {
    let mut child = Cmd::new("tar")
        .arg("-C")
        .arg_path(data_dir)
        .args(["--numeric-owner", "-cf", "-", "."])
        .spawn_piped(Pipe::Stdout)?;
    let stdout = child
        .stdout
        .take()
        .context("tar stdout was not captured")?;

    let pumped = stream::pump(stdout, tokio::fs::File::from_std(file), Some(size), "archive").await;
    if pumped.is_err() {
        let _ = child.start_kill();
    }
    let status = child.wait().await.context("Failed to wait for tar")?;
    pumped.with_context(|| format!("Failed to stream archive of {}", data_dir.display()))?;
    process::check_status("tar", status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_file_name_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(archive_file_name(date), "yumsync_20240307.tar");
    }

    #[test]
    fn test_archive_path_under_mount() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(
            archive_path(Path::new("/archive"), date),
            PathBuf::from("/archive/yumsync_20231231.tar")
        );
    }
}
