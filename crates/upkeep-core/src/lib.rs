//! upkeep-core: Update orchestration engine
//!
//! Implements the `UpdateCoordinator` actor using the kameo framework,
//! together with the pre-flight resource check, the duplicate binary
//! detector, progress tracking and engine configuration.

pub mod actor;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod message;
pub mod monitor;
pub mod progress;
pub mod resources;

pub use actor::coordinator::{NOT_INSTALLED, UpdateCoordinator, UpdateCoordinatorArgs};
pub use config::{DuplicateConfig, EngineConfig, ResourceThresholds};
pub use error::CoreError;
pub use message::{GetOverview, ManagerAvailability, ManagerSelection, RunUpdate, UpdateRequest};
pub use monitor::{MonitorSummary, ResourceMonitor, ResourceSample};
pub use progress::{ManagerProgress, ManagerState, ProgressTracker, StepProgress, StepStatus};
pub use resources::{
    HttpProbe, NetworkProbe, Repository, ResourceManager, SysinfoProbe, SystemProbe,
};
