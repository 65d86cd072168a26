//! upkeep-pkg: package manager update routines
//!
//! One dedicated routine per supported manager (brew, asdf, sdkman, apt,
//! pacman, yay, pip, npm), the compatibility filter chain consulted for
//! sub-units, and version change tracking.

pub mod apt;
pub mod asdf;
pub mod brew;
pub mod compat;
pub mod env;
pub mod error;
pub mod npm;
pub mod pacman;
pub mod pip;
pub mod registry;
pub mod sdkman;
pub mod traits;
pub mod types;
pub mod versions;
pub mod yay;

#[cfg(test)]
mod testing;

pub use compat::{CompatibilityFilter, FilterDocument, FilterSet};
pub use env::EnvSnapshot;
pub use error::PackageError;
pub use registry::routine;
pub use traits::{
    LOCK_RETRY_DELAY, QUERY_TIMEOUT, RoutineContext, Screened, StepObserver, UpdateRoutine,
};
pub use types::{ManagerKind, UpdateOptions, UpgradablePackage};
pub use versions::VersionTracker;
