//! CLI argument parsing with clap. Defines the `Cli` struct, the `Mode` enum and
//! the `Task` each working mode runs.

use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "entrypoint",
    version,
    about = "Container entrypoint for yumsync",
    disable_help_subcommand = true,
    after_help = "With no mode, `sync` runs.\n\nExit codes:\n  0  success\n  1  not root, usage or configuration error, help shown\n  2  archive directory missing or today's archive already exists\n  3  restore file missing\n  4  data directory not empty on restore"
)]
pub struct Cli {
    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Mirror repositories with yumsync (default); extra args go to yumsync
    #[command(disable_help_flag = true)]
    Sync {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Re-own everything under the data directory, then exit
    Repair,

    /// Write today's tar archive of the data directory to the archive mount
    Archive,

    /// Extract the restore file into an empty data directory
    Restore,

    /// Show usage and exit with status 1
    Help,
}

impl Cli {
    /// Selected mode, `sync` without arguments when none was given.
    pub fn mode(self) -> Mode {
        self.mode.unwrap_or(Mode::Sync { args: Vec::new() })
    }
}

/// A mode that does work: anything but `help`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Sync { args: Vec<String> },
    Repair,
    Archive,
    Restore,
}

impl Mode {
    /// The work this mode runs, `None` for `help`.
    pub fn task(self) -> Option<Task> {
        match self {
            Mode::Sync { args } => Some(Task::Sync { args }),
            Mode::Repair => Some(Task::Repair),
            Mode::Archive => Some(Task::Archive),
            Mode::Restore => Some(Task::Restore),
            Mode::Help => None,
        }
    }
}

/// Print the usage text to stdout.
pub fn print_usage() {
    let mut cmd = Cli::command();
    let _ = cmd.print_help();
    println!();
}
