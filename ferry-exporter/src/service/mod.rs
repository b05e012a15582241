//! Orchestration services
//!
//! The supervisor and runner drive job cycles and executions; reporting,
//! bootstrap, cleanup and health back the service jobs and the status API.

pub mod bootstrap;
pub mod cleanup;
pub mod context;
pub mod health;
pub mod reporting;
pub mod runner;
pub mod supervisor;

use std::sync::Arc;

use crate::config::Config;
use crate::integrations::Collaborators;
use crate::repository::Store;

pub use context::ExecutionContext;

/// Everything a job cycle or execution needs, shared process-wide
pub struct Services {
    pub store: Store,
    pub config: Arc<Config>,
    pub collaborators: Collaborators,
}

impl Services {
    pub fn new(store: Store, config: Arc<Config>, collaborators: Collaborators) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            collaborators,
        })
    }
}
