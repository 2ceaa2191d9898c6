//! Shared test utilities for entrypoint tests.

#![allow(dead_code)]

use nix::unistd::{getegid, geteuid};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use yumsync_entrypoint::config::Config;

/// Test environment with temporary data, archive and config directories.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Mirror data directory
    pub data: PathBuf,
    /// Archive mount (created)
    pub archive: PathBuf,
    /// Config directory (created, empty)
    pub config_dir: PathBuf,
    /// Restore file location (not created)
    pub restore: PathBuf,
    /// Root of a fake account database
    pub sysroot: PathBuf,
}

impl TestEnv {
    /// Create a new test environment with temporary directories.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let data = base.join("data");
        let archive = base.join("archive");
        let config_dir = base.join("config");
        let restore = base.join("restore");
        let sysroot = base.join("sysroot");

        for dir in [&data, &archive, &config_dir, &sysroot.join("etc")] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }

        Self {
            _temp_dir: temp_dir,
            data,
            archive,
            config_dir,
            restore,
            sysroot,
        }
    }

    /// Environment variables pointing the entrypoint at this environment.
    pub fn vars(&self) -> HashMap<String, String> {
        [
            ("PUID", geteuid().as_raw().to_string()),
            ("PGID", getegid().as_raw().to_string()),
            ("YUMSYNC_DATA", self.data.display().to_string()),
            ("YUMSYNC_CONF", self.config_dir.display().to_string()),
            ("ARCHIVE_DIR", self.archive.display().to_string()),
            ("RESTORE_FILE", self.restore.display().to_string()),
            ("OVL_CONF", self.sysroot.join("ovl.conf").display().to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    /// Configuration for this environment, owned by the current process.
    pub fn config(&self) -> Config {
        let mut config = Config::from_vars(self.vars()).expect("valid test config");
        config.sysroot = self.sysroot.clone();
        config
    }
}

/// Populate a directory with a small mirror-like tree.
pub fn create_mock_mirror(data: &Path) {
    fs::create_dir_all(data.join("centos/7/os/Packages")).expect("Failed to create mirror dirs");
    fs::create_dir_all(data.join("centos/7/os/repodata")).expect("Failed to create mirror dirs");
    fs::write(data.join("centos/7/os/Packages/bash.rpm"), vec![7u8; 4096])
        .expect("Failed to write package");
    fs::write(data.join("centos/7/os/repodata/repomd.xml"), "<repomd/>\n")
        .expect("Failed to write repomd");
    std::os::unix::fs::symlink("7", data.join("centos/latest")).expect("Failed to create symlink");
}

/// Sorted relative paths of every entry under `dir`.
pub fn list_tree(dir: &Path) -> Vec<String> {
    let mut entries: Vec<String> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .map(|e| {
            let e = e.expect("Failed to walk tree");
            e.path()
                .strip_prefix(dir)
                .expect("entry under root")
                .display()
                .to_string()
        })
        .collect();
    entries.sort();
    entries
}

/// Write an account database where the service account already matches the
/// current process identity, so setup has nothing to renumber.
pub fn write_matching_accounts(env: &TestEnv) {
    let uid = geteuid().as_raw();
    let gid = getegid().as_raw();
    fs::write(
        env.sysroot.join("etc/passwd"),
        format!(
            "root:x:0:0:root:/root:/bin/bash\nyumsync:x:{}:{}::{}:/sbin/nologin\n",
            uid,
            gid,
            env.data.display()
        ),
    )
    .expect("Failed to create passwd");
    fs::write(
        env.sysroot.join("etc/group"),
        format!("root:x:0:\nyumsync:x:{}:\n", gid),
    )
    .expect("Failed to create group");
}
