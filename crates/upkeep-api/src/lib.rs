//! upkeep-api: Shared data model
//!
//! Contains the run result document, request-side enums, resource and
//! duplicate reports, and the progress event stream shared by the
//! engine and its renderers.

pub mod events;
pub mod mode;
pub mod report;
pub mod result;

pub use events::ProgressEvent;
pub use mode::{CompatMode, ParseModeError, Strategy};
pub use report::{DuplicateConflict, ResourceReport};
pub use result::{
    ManagerResult, ManagerStatus, PackageChange, PluginResult, RunMode, RunResult, SkipRecord,
    Totals, UpdateType,
};
