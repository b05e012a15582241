//! Execution context handed to task bodies
//!
//! Wraps the execution being run, a snapshot of its job, and the helpers a
//! body uses to narrate progress and record its outcome.

use ferry_core::domain::{Execution, JobDefinition, StatusCode, TaskStateUpdate};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::Services;
use crate::config::Config;
use crate::integrations::{Collaborators, PlatformApi};
use crate::repository::{self, Store, StoreError};
use crate::tasks::TaskError;

pub struct ExecutionContext {
    services: Arc<Services>,
    execution: Execution,
    job: JobDefinition,
}

impl ExecutionContext {
    pub fn new(services: Arc<Services>, execution: Execution, job: JobDefinition) -> Self {
        Self {
            services,
            execution,
            job,
        }
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    pub fn job(&self) -> &JobDefinition {
        &self.job
    }

    pub fn store(&self) -> &Store {
        &self.services.store
    }

    pub fn config(&self) -> &Config {
        &self.services.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.services.collaborators
    }

    /// Persist a status transition; stage codes become visible immediately
    pub async fn set_status(&self, status: StatusCode) -> Result<(), StoreError> {
        debug!(
            "Execution {} ({}) -> {}",
            self.execution.id, self.execution.task, status
        );
        repository::execution::set_status(self.store(), self.execution.id, status).await
    }

    /// Merge top-level keys into the execution's details
    pub async fn update_execution_details(
        &mut self,
        patch: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut details = match std::mem::take(&mut self.execution.details) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        details.extend(patch);
        self.execution.details = Value::Object(details);

        repository::execution::save_details(self.store(), self.execution.id, &self.execution.details)
            .await
    }

    /// Replace the execution's details outright
    pub async fn replace_execution_details(&mut self, details: Value) -> Result<(), StoreError> {
        self.execution.details = details;
        repository::execution::save_details(self.store(), self.execution.id, &self.execution.details)
            .await
    }

    /// Merge task state updates into the owning job's details
    pub async fn update_job_task_states(
        &mut self,
        updates: &[TaskStateUpdate],
    ) -> Result<(), StoreError> {
        self.job.details =
            repository::job::update_task_states(self.store(), self.job.id, updates).await?;
        Ok(())
    }

    /// Point this cycle's run link at the authoritative execution
    ///
    /// Without an override the link points at this execution.
    pub async fn update_job_run(&self, successful_execution_id: Option<i64>) -> Result<(), StoreError> {
        let link = repository::job_run::find(
            self.store(),
            self.execution.job_id,
            self.execution.run_cycle_id,
            self.execution.task,
        )
        .await?
        .ok_or_else(|| {
            StoreError::not_found(
                "JobRun",
                format!(
                    "{}/{}/{}",
                    self.execution.job_id, self.execution.run_cycle_id, self.execution.task
                ),
            )
        })?;

        let execution_id = successful_execution_id.unwrap_or(self.execution.id);
        repository::job_run::set_last_successful(self.store(), link.id, execution_id).await
    }

    /// Platform client authenticated with the job's API key
    pub fn platform(&self) -> Result<Arc<dyn PlatformApi>, TaskError> {
        let api_key = self.job.secrets.as_ref().ok_or_else(|| {
            TaskError::Config(format!("Job {} has no platform API key", self.job.export_id))
        })?;

        Ok(self.collaborators().platform.connect(api_key)?)
    }

    /// Work must run even when fingerprints match
    pub fn force_run(&self) -> bool {
        self.config().force_run
    }
}
