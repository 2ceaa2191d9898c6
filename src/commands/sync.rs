//! Sync command - runs yumsync as the service identity.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::{chown, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::{Config, Identity};
use crate::identity;
use crate::process::{self, Cmd};

/// The config file the tool will be pointed at.
///
/// Holds the private copy alive, if one was made, until the tool exits.
pub struct ResolvedConfig {
    pub path: PathBuf,
    private: Option<TempDir>,
}

impl ResolvedConfig {
    /// True when the original was unreadable and a private copy is in use.
    pub fn is_copy(&self) -> bool {
        self.private.is_some()
    }
}

/// Probe readability of `path` as the service identity.
fn readable_as(identity: &Identity, path: &Path) -> Result<bool> {
    let result = Cmd::new("test")
        .arg("-r")
        .arg_path(path)
        .as_identity(identity.uid, identity.gid)
        .allow_fail()
        .run()?;
    Ok(result.success())
}

/// Resolve the repository config, probing readability as the service user.
pub fn resolve_config(config: &Config) -> Result<ResolvedConfig> {
    resolve_config_with(config, |path| readable_as(&config.identity, path))
}

/// As [`resolve_config`], with the readability probe supplied by the caller.
pub fn resolve_config_with<F>(config: &Config, readable: F) -> Result<ResolvedConfig>
where
    F: Fn(&Path) -> Result<bool>,
{
    let path = config.config_file();

    if !path.exists() {
        eprintln!(
            "warning: {} not found, yumsync will report the error",
            path.display()
        );
        return Ok(ResolvedConfig {
            path,
            private: None,
        });
    }

    if readable(&path)? {
        return Ok(ResolvedConfig {
            path,
            private: None,
        });
    }

    eprintln!(
        "{} is not readable by {}, using a private copy",
        path.display(),
        config.identity.user
    );
    let (dir, copy) = private_copy(&path, &config.identity)?;
    Ok(ResolvedConfig {
        path: copy,
        private: Some(dir),
    })
}

/// Copy `path` into a fresh 0700 directory owned by the identity.
///
/// The copy itself is owned by the identity and readable only by it.
fn private_copy(path: &Path, identity: &Identity) -> Result<(TempDir, PathBuf)> {
    let dir = tempfile::Builder::new()
        .prefix("yumsync-config-")
        .tempdir()
        .context("Failed to create private config directory")?;
    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700))?;
    chown(dir.path(), Some(identity.uid), Some(identity.gid))
        .with_context(|| format!("Failed to chown {}", dir.path().display()))?;

    let name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?;
    let copy = dir.path().join(name);
    fs::copy(path, &copy)
        .with_context(|| format!("Failed to copy {} to {}", path.display(), copy.display()))?;
    chown(&copy, Some(identity.uid), Some(identity.gid))
        .with_context(|| format!("Failed to chown {}", copy.display()))?;
    fs::set_permissions(&copy, fs::Permissions::from_mode(0o400))
        .with_context(|| format!("Failed to chmod {}", copy.display()))?;

    Ok((dir, copy))
}

/// Turn off every `enabled=1` line in a yum plugin config.
///
/// Returns None when nothing needed changing.
pub fn disable_plugin_text(content: &str) -> Option<String> {
    let mut changed = false;
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        let ending = &line[body.len()..];
        match body.split_once('=') {
            Some((key, value)) if key.trim() == "enabled" && value.trim() == "1" => {
                out.push_str("enabled=0");
                out.push_str(ending);
                changed = true;
            }
            _ => out.push_str(line),
        }
    }
    changed.then_some(out)
}

/// Disable the overlay plugin in place if its config exists.
///
/// The plugin fails with permission errors when yum runs unprivileged.
pub fn disable_ovl(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match disable_plugin_text(&content) {
        Some(updated) => {
            fs::write(path, updated)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Disabled overlay plugin in {}", path.display());
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Build the tool invocation for a resolved config path.
pub fn tool_command(config: &Config, config_path: &Path, args: &[String]) -> Cmd {
    let id = &config.identity;
    let mut cmd = Cmd::new(&config.tool)
        .arg("--directory")
        .arg_path(&config.data_dir)
        .arg("--config")
        .arg_path(config_path)
        .args(args)
        .as_identity(id.uid, id.gid)
        .env("USER", &id.user);
    if let Some(home) = identity::home_of(config) {
        cmd = cmd.env("HOME", home.to_string_lossy());
    }
    cmd
}

/// Execute the sync command, returning the tool's exit status.
pub async fn cmd_sync(config: &Config, args: &[String]) -> Result<i32> {
    let resolved = resolve_config(config)?;
    disable_ovl(&config.ovl_conf)?;

    let cmd = tool_command(config, &resolved.path, args);
    eprintln!("Running: {}", cmd.display());
    let status = cmd.run_foreground().await?;

    drop(resolved);
    Ok(process::exit_code(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{getegid, geteuid};
    use std::collections::HashMap;

    fn test_config(dir: &Path) -> Config {
        let vars: HashMap<String, String> = [
            ("PUID", geteuid().as_raw().to_string()),
            ("PGID", getegid().as_raw().to_string()),
            ("YUMSYNC_DATA", dir.join("data").display().to_string()),
            ("YUMSYNC_CONF", dir.join("config").display().to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let mut config = Config::from_vars(vars).unwrap();
        config.sysroot = dir.to_path_buf();
        config
    }

    #[test]
    fn test_missing_config_passes_through() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let resolved = resolve_config_with(&config, |_| panic!("missing file must not be checked")).unwrap();
        assert_eq!(resolved.path, config.config_file());
        assert!(!resolved.is_copy());
    }

    #[test]
    fn test_readable_config_used_in_place() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        fs::create_dir_all(&config.config_dir).unwrap();
        fs::write(config.config_file(), "repos: []\n").unwrap();

        let resolved = resolve_config_with(&config, |_| Ok(true)).unwrap();
        assert_eq!(resolved.path, config.config_file());
        assert!(!resolved.is_copy());
    }

    #[test]
    fn test_unreadable_config_is_copied_privately() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        fs::create_dir_all(&config.config_dir).unwrap();
        fs::write(config.config_file(), "repos: []\n").unwrap();

        let resolved = resolve_config_with(&config, |_| Ok(false)).unwrap();
        assert!(resolved.is_copy());
        assert_ne!(resolved.path, config.config_file());
        assert_eq!(fs::read_to_string(&resolved.path).unwrap(), "repos: []\n");

        let mode = fs::metadata(&resolved.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o400);
        let dir_mode = fs::metadata(resolved.path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);

        let copy = resolved.path.clone();
        drop(resolved);
        assert!(!copy.exists());
    }

    #[test]
    fn test_disable_plugin_text() {
        let input = "[main]\nenabled=1\n";
        assert_eq!(
            disable_plugin_text(input).as_deref(),
            Some("[main]\nenabled=0\n")
        );
        assert_eq!(
            disable_plugin_text("[main]\nenabled = 1\r\n").as_deref(),
            Some("[main]\nenabled=0\r\n")
        );
        assert!(disable_plugin_text("[main]\nenabled=0\n").is_none());
        assert!(disable_plugin_text("[main]\nenabled_repos=1\n").is_none());
    }

    #[test]
    fn test_disable_ovl_in_place() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ovl.conf");
        assert!(!disable_ovl(&path).unwrap());

        fs::write(&path, "[main]\nenabled=1\n").unwrap();
        assert!(disable_ovl(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[main]\nenabled=0\n");
        assert!(!disable_ovl(&path).unwrap());
    }

    #[test]
    fn test_tool_command_shape() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let cmd = tool_command(
            &config,
            Path::new("/config/repos.yml"),
            &["--stable".to_string()],
        );
        assert_eq!(
            cmd.display(),
            format!(
                "yumsync --directory {} --config /config/repos.yml --stable",
                config.data_dir.display()
            )
        );
    }

    #[tokio::test]
    async fn test_cmd_sync_returns_tool_status() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        config.ovl_conf = tmp.path().join("ovl.conf");
        config.tool = "false".to_string();
        let code = cmd_sync(&config, &[]).await.unwrap();
        assert_eq!(code, 1);
    }
}
