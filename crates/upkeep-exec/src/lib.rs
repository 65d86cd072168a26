//! upkeep-exec: Native command execution
//!
//! Provides the executor trait the update routines talk to and a local
//! implementation built on `tokio::process`. Commands are spawned
//! directly, never through a shell.

pub mod command;
pub mod error;
pub mod local;
pub mod result;
pub mod traits;

pub use command::CommandSpec;
pub use error::ExecError;
pub use local::LocalExecutor;
pub use result::CommandResult;
pub use traits::CommandExecutor;
