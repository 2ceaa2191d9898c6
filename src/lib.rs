//! yumsync container entrypoint.
//!
//! Reconciles the service account with `PUID`/`PGID`, keeps the data
//! directory owned by it, and runs one mode: sync, repair, archive or
//! restore.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod identity;
pub mod ownership;
pub mod privilege;
pub mod process;
pub mod stream;

use anyhow::Result;

use cli::{Cli, Task};
use config::Config;

/// Run the entrypoint, returning the status the process should exit with.
pub async fn run(cli: Cli) -> Result<i32> {
    let Some(task) = cli.mode().task() else {
        cli::print_usage();
        return Ok(1);
    };

    privilege::require_root()?;
    let config = Config::from_env()?;
    config.print();
    run_mode(task, &config).await
}

/// Setup, ownership repair and dispatch for a loaded configuration.
pub async fn run_mode(task: Task, config: &Config) -> Result<i32> {
    identity::setup(config)?;
    commands::cmd_repair(config, task == Task::Repair)?;

    match task {
        Task::Sync { args } => commands::cmd_sync(config, &args).await,
        Task::Repair => Ok(0),
        Task::Archive => {
            commands::cmd_archive(config).await?;
            Ok(0)
        }
        Task::Restore => {
            commands::cmd_restore(config).await?;
            Ok(0)
        }
    }
}
