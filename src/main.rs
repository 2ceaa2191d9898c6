//! entrypoint - yumsync container entrypoint.
//!
//! Modes:
//! - sync (default): run yumsync as the service user
//! - repair: fix ownership of the data directory
//! - archive: tar the data directory to /archive
//! - restore: extract /restore into an empty data directory

use clap::error::ErrorKind;
use clap::Parser;
use std::process::ExitCode;

use yumsync_entrypoint::cli::Cli;
use yumsync_entrypoint::error::exit_code_for;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    // Load .env if present
    dotenvy::dotenv().ok();

    match yumsync_entrypoint::run(cli).await {
        Ok(code) => ExitCode::from(clamp(code)),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(clamp(exit_code_for(&e)))
        }
    }
}

fn clamp(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
