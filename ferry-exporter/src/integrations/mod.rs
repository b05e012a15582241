//! External collaborators consumed by task bodies
//!
//! Each collaborator is a narrow async trait with a closed error enum, so
//! the runner can map every failure to a status code.

pub mod platform;
pub mod registry;
pub mod storage;

use std::sync::Arc;

pub use platform::{HttpPlatformConnector, PlatformApi, PlatformConnector};
pub use registry::{ImageRegistry, PodmanRegistry, RegistryError};
pub use storage::{FsObjectStore, ObjectStore, StorageError};

/// Handles to every collaborator, shared by all executions
#[derive(Clone)]
pub struct Collaborators {
    pub platform: Arc<dyn PlatformConnector>,
    pub registry: Arc<dyn ImageRegistry>,
    pub storage: Arc<dyn ObjectStore>,
}
