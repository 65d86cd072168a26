//! Actor implementations

pub mod coordinator;

pub use coordinator::{NOT_INSTALLED, UpdateCoordinator, UpdateCoordinatorArgs};
