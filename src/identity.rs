//! Service account renumbering.
//!
//! Reads the account database under a configurable root and renumbers the
//! service user and group with `usermod`/`groupmod` when their IDs differ
//! from the configured target.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::process::Cmd;

/// A user entry from `etc/passwd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

/// One renumbering step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Gid(u32),
    Uid(u32),
}

/// Look up a user in `<root>/etc/passwd`.
///
/// Returns:
/// - Ok(Some(account)) if user found
/// - Ok(None) if user not found or file doesn't exist
/// - Err if file exists but is corrupted/unreadable
pub fn lookup_user(root: &Path, username: &str) -> Result<Option<Account>> {
    let passwd_path = root.join("etc/passwd");

    if !passwd_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&passwd_path)
        .with_context(|| format!("Failed to read passwd file at {}", passwd_path.display()))?;

    for line in content.lines() {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() >= 4 && parts[0] == username {
            let uid: u32 = parts[2].parse().with_context(|| {
                format!(
                    "Corrupted passwd file: invalid UID '{}' for user '{}' at {}",
                    parts[2], username, passwd_path.display()
                )
            })?;
            let gid: u32 = parts[3].parse().with_context(|| {
                format!(
                    "Corrupted passwd file: invalid GID '{}' for user '{}' at {}",
                    parts[3], username, passwd_path.display()
                )
            })?;
            let home = parts.get(5).map(PathBuf::from).unwrap_or_default();
            return Ok(Some(Account {
                uid,
                gid,
                home,
            }));
        }
    }
    Ok(None)
}

/// Look up a group's GID in `<root>/etc/group`.
///
/// Returns:
/// - Ok(Some(gid)) if group found
/// - Ok(None) if group not found or file doesn't exist
/// - Err if file exists but is corrupted/unreadable
pub fn lookup_group(root: &Path, groupname: &str) -> Result<Option<u32>> {
    let group_path = root.join("etc/group");

    if !group_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&group_path)
        .with_context(|| format!("Failed to read group file at {}", group_path.display()))?;

    for line in content.lines() {
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() >= 3 && parts[0] == groupname {
            let gid: u32 = parts[2].parse().with_context(|| {
                format!(
                    "Corrupted group file: invalid GID '{}' for group '{}' at {}",
                    parts[2], groupname, group_path.display()
                )
            })?;
            return Ok(Some(gid));
        }
    }
    Ok(None)
}

/// Compute the renumbering needed to move `(uid, gid)` to the target.
///
/// The group goes first so `usermod` never points at a stale GID.
pub fn plan(current_uid: u32, current_gid: u32, target_uid: u32, target_gid: u32) -> Vec<Change> {
    let mut changes = Vec::new();
    if current_gid != target_gid {
        changes.push(Change::Gid(target_gid));
    }
    if current_uid != target_uid {
        changes.push(Change::Uid(target_uid));
    }
    changes
}

/// The `groupmod`/`usermod` invocations that apply `changes`, in order.
pub fn renumber_commands(changes: &[Change], user: &str, group: &str) -> Vec<Cmd> {
    changes
        .iter()
        .map(|change| match *change {
            Change::Gid(gid) => Cmd::new("groupmod")
                .args(["-o", "-g"])
                .arg(gid.to_string())
                .arg(group)
                .error_msg(format!("Failed to renumber group '{}'", group)),
            Change::Uid(uid) => Cmd::new("usermod")
                .args(["-o", "-u"])
                .arg(uid.to_string())
                .arg(user)
                .error_msg(format!("Failed to renumber user '{}'", user)),
        })
        .collect()
}

/// Reconcile the service account with the configured identity.
///
/// Returns the changes that were applied; empty when nothing differed.
pub fn setup(config: &Config) -> Result<Vec<Change>> {
    let id = &config.identity;

    let account = lookup_user(&config.sysroot, &id.user)?
        .with_context(|| format!("Service user '{}' does not exist", id.user))?;
    let group_gid = lookup_group(&config.sysroot, &id.group)?
        .with_context(|| format!("Service group '{}' does not exist", id.group))?;

    let changes = plan(account.uid, group_gid, id.uid, id.gid);
    let commands = renumber_commands(&changes, &id.user, &id.group);
    for (change, cmd) in changes.iter().zip(commands) {
        match *change {
            Change::Gid(gid) => {
                eprintln!("Changing GID of group '{}' from {} to {}", id.group, group_gid, gid)
            }
            Change::Uid(uid) => {
                eprintln!("Changing UID of user '{}' from {} to {}", id.user, account.uid, uid)
            }
        }
        cmd.run()?;
    }

    Ok(changes)
}

/// Home directory of the service user, if the account database knows it.
pub fn home_of(config: &Config) -> Option<PathBuf> {
    match lookup_user(&config.sysroot, &config.identity.user) {
        Ok(Some(account)) if !account.home.as_os_str().is_empty() => Some(account.home),
        _ => None,
    }
}
