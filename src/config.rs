//! Configuration management for the entrypoint.
//!
//! Built once at startup from the process environment (after `.env` has been
//! loaded by `main`) and handed to every mode by reference.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::EntrypointError;

pub const DEFAULT_USER: &str = "yumsync";
pub const DEFAULT_GROUP: &str = "yumsync";
pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_CONFIG_DIR: &str = "/config";
pub const DEFAULT_ARCHIVE_DIR: &str = "/archive";
pub const DEFAULT_RESTORE_FILE: &str = "/restore";
pub const DEFAULT_OVL_CONF: &str = "/etc/yum/pluginconf.d/ovl.conf";
pub const DEFAULT_TOOL: &str = "yumsync";

/// Name of the repository definition file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "repos.yml";

/// Target numeric identity and the account names it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
    pub user: String,
    pub group: String,
}

/// Entrypoint configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub identity: Identity,
    /// Mirror data directory handed to the tool (YUMSYNC_DATA)
    pub data_dir: PathBuf,
    /// Directory holding repos.yml (YUMSYNC_CONF)
    pub config_dir: PathBuf,
    /// Mount point receiving archives (ARCHIVE_DIR)
    pub archive_dir: PathBuf,
    /// Tar stream consumed by restore (RESTORE_FILE)
    pub restore_file: PathBuf,
    /// Overlay plugin config disabled before sync (OVL_CONF)
    pub ovl_conf: PathBuf,
    /// Program launched by sync (YUMSYNC_BIN)
    pub tool: String,
    /// Root of the account database, `/` outside of tests
    pub sysroot: PathBuf,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, EntrypointError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build configuration from an explicit variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, EntrypointError> {
        let uid = parse_id(&vars, "PUID")?;
        let gid = parse_id(&vars, "PGID")?;

        let text = |key: &str, default: &str| -> Result<String, EntrypointError> {
            match vars.get(key) {
                Some(value) if value.trim().is_empty() => Err(EntrypointError::Config(format!(
                    "{} is set but empty",
                    key
                ))),
                Some(value) => Ok(value.trim().to_string()),
                None => Ok(default.to_string()),
            }
        };

        Ok(Self {
            identity: Identity {
                uid,
                gid,
                user: text("YUMSYNC_USER", DEFAULT_USER)?,
                group: text("YUMSYNC_GROUP", DEFAULT_GROUP)?,
            },
            data_dir: PathBuf::from(text("YUMSYNC_DATA", DEFAULT_DATA_DIR)?),
            config_dir: PathBuf::from(text("YUMSYNC_CONF", DEFAULT_CONFIG_DIR)?),
            archive_dir: PathBuf::from(text("ARCHIVE_DIR", DEFAULT_ARCHIVE_DIR)?),
            restore_file: PathBuf::from(text("RESTORE_FILE", DEFAULT_RESTORE_FILE)?),
            ovl_conf: PathBuf::from(text("OVL_CONF", DEFAULT_OVL_CONF)?),
            tool: text("YUMSYNC_BIN", DEFAULT_TOOL)?,
            sysroot: PathBuf::from("/"),
        })
    }

    /// Path of the repository definition file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Effective settings, one per line, in the order they are printed.
    pub fn summary(&self) -> Vec<String> {
        vec![
            format!(
                "PUID/PGID: {}:{} ({}:{})",
                self.identity.uid, self.identity.gid, self.identity.user, self.identity.group
            ),
            format!("YUMSYNC_DATA: {}", self.data_dir.display()),
            format!("YUMSYNC_CONF: {}", self.config_dir.display()),
            format!("ARCHIVE_DIR: {}", self.archive_dir.display()),
            format!("RESTORE_FILE: {}", self.restore_file.display()),
            format!("OVL_CONF: {}", self.ovl_conf.display()),
            format!("YUMSYNC_BIN: {}", self.tool),
        ]
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        eprintln!("Configuration:");
        for line in self.summary() {
            eprintln!("  {}", line);
        }
    }
}

fn parse_id(vars: &HashMap<String, String>, key: &str) -> Result<u32, EntrypointError> {
    let raw = vars
        .get(key)
        .ok_or_else(|| EntrypointError::Config(format!("{} is not set", key)))?;
    raw.trim().parse().map_err(|_| {
        EntrypointError::Config(format!("{} must be a numeric id, got '{}'", key, raw))
    })
}
