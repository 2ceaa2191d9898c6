//! Data directory ownership scan and repair.

use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{lchown, MetadataExt};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Identity;
use crate::stream;

/// What a repair pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Directory ownership already matched and repair was not forced.
    Skipped,
    Repaired { scanned: usize, changed: usize },
}

/// Owner `(uid, gid)` of `path`, following a symlink at `path` itself.
pub fn owner_of(path: &Path) -> Result<(u32, u32)> {
    let meta = fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok((meta.uid(), meta.gid()))
}

/// True when the directory's own owner differs from the identity.
pub fn needs_repair(dir: &Path, identity: &Identity) -> Result<bool> {
    let (uid, gid) = owner_of(dir)?;
    Ok(uid != identity.uid || gid != identity.gid)
}

/// Visit every entry under `dir` (itself included) not owned by `uid:gid`.
///
/// Symlinks are reported by their own ownership and never traversed. The
/// root is resolved through a symlink so a linked data directory is scanned.
/// Entries are handed to `visit` as the walk reaches them. Returns how many
/// entries were examined.
pub fn walk_mismatched<F>(dir: &Path, uid: u32, gid: u32, mut visit: F) -> Result<usize>
where
    F: FnMut(&Path) -> Result<()>,
{
    let root = fs::canonicalize(dir)
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;

    let mut scanned = 0;
    for entry in WalkDir::new(&root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            // Removed between readdir and stat.
            Err(e) if stream::vanished(&e) => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to scan {}", root.display()))
            }
        };
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) if stream::vanished(&e) => continue,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat {}", entry.path().display()))
            }
        };
        scanned += 1;
        if meta.uid() != uid || meta.gid() != gid {
            visit(entry.path())?;
        }
    }
    Ok(scanned)
}

/// Bring the data directory's ownership in line with the identity.
///
/// Without `force` nothing happens when the directory itself is already
/// owned correctly. A missing directory is created first.
pub fn repair(dir: &Path, identity: &Identity, force: bool) -> Result<RepairOutcome> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    }

    if !force && !needs_repair(dir, identity)? {
        return Ok(RepairOutcome::Skipped);
    }

    eprintln!(
        "Fixing ownership of {} to {}:{}, this may take a while...",
        dir.display(),
        identity.uid,
        identity.gid
    );

    let mut changed = 0;
    let scanned = walk_mismatched(dir, identity.uid, identity.gid, |path| {
        match lchown(path, Some(identity.uid), Some(identity.gid)) {
            Ok(()) => changed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to chown {}", path.display()))
            }
        }
        Ok(())
    })?;

    eprintln!("  {} entries scanned, {} re-owned", scanned, changed);
    Ok(RepairOutcome::Repaired { scanned, changed })
}
