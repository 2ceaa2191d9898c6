//! Mode handlers.
//!
//! Each submodule handles one entrypoint mode:
//! - `sync` - Run yumsync as the service identity
//! - `repair` - Fix data directory ownership
//! - `archive` - Write today's tar archive
//! - `restore` - Extract an archive into an empty data directory

pub mod archive;
pub mod repair;
pub mod restore;
pub mod sync;

pub use archive::cmd_archive;
pub use repair::cmd_repair;
pub use restore::cmd_restore;
pub use sync::cmd_sync;
