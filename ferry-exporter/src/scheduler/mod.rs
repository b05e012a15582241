//! Trigger scheduler
//!
//! Owns every registration the service has: one recurring trigger per job,
//! optional immediate job triggers, and one-shot triggers for executions.
//! Registrations are keyed by the job's export id or the execution's
//! external id, and each key is registered at most once.
//!
//! Job cycles run on the supervisors pool and executions on the larger
//! executions pool, so a full set of supervisors never starves the work
//! they wait on.

pub mod trigger;

use chrono::Utc;
use ferry_core::domain::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::repository::{self, StoreError};
use crate::service::{Services, runner, supervisor};
use trigger::IntervalSchedule;

/// Smallest supervisors pool regardless of configuration
pub const MIN_SUPERVISORS: usize = 3;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Scheduler is shut down")]
    ShutDown,
}

/// Handle to the scheduler; clones share the same registrations and pools
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    services: Arc<Services>,
    supervisors: Arc<Semaphore>,
    executions: Arc<Semaphore>,
    registrations: Mutex<HashMap<String, Registration>>,
    next_registration: AtomicU64,
    execution_stopped: Notify,
    shut_down: AtomicBool,
}

struct Registration {
    id: u64,
    handle: AbortHandle,
    /// Max-one-instance flag, carried over when a job is re-registered
    running: Arc<AtomicBool>,
}

/// Pool sizes derived from the configured worker count
pub fn pool_sizes(max_workers: usize) -> (usize, usize) {
    let supervisors = max_workers.max(MIN_SUPERVISORS);
    (supervisors, supervisors * 3)
}

fn run_now_key(export_id: &str) -> String {
    format!("{}:run-now", export_id)
}

impl Scheduler {
    pub fn new(services: Arc<Services>) -> Self {
        let (supervisors, executions) = pool_sizes(services.config.max_workers);
        info!(
            "Scheduler pools: {} supervisors, {} executions",
            supervisors, executions
        );

        Self {
            inner: Arc::new(Inner {
                services,
                supervisors: Arc::new(Semaphore::new(supervisors)),
                executions: Arc::new(Semaphore::new(executions)),
                registrations: Mutex::new(HashMap::new()),
                next_registration: AtomicU64::new(1),
                execution_stopped: Notify::new(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.inner.services
    }

    /// Woken every time an execution trigger finishes, whatever its outcome
    pub fn execution_stopped(&self) -> &Notify {
        &self.inner.execution_stopped
    }

    /// Register every persisted job
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.refresh_jobs().await
    }

    /// Register a recurring trigger for a job, replacing any earlier one
    ///
    /// With `run_now` the job also fires once immediately, under its own key.
    pub async fn add_job(&self, job_id: i64, run_now: bool) -> Result<(), SchedulerError> {
        let job = repository::job::get(&self.inner.services.store, job_id).await?;
        let schedule = IntervalSchedule {
            period: Duration::from_secs(job.run_frequency_seconds.max(1) as u64),
            jitter: self.inner.services.config.schedule_jitter,
            misfire_grace: self.inner.services.config.misfire_grace,
        };

        let mut registrations = self.lock_registrations()?;

        let running = match registrations.remove(&job.export_id) {
            Some(previous) => {
                previous.handle.abort();
                previous.running
            }
            None => Arc::new(AtomicBool::new(false)),
        };

        let scheduler = self.clone();
        let name = format!("{} job {}", job.job_type, job.export_id);
        let handle = tokio::spawn(trigger::run_interval(
            name,
            schedule,
            running.clone(),
            move || {
                let scheduler = scheduler.clone();
                async move { scheduler.fire_job(job_id).await }
            },
        ))
        .abort_handle();

        let id = self.next_registration_id();
        registrations.insert(
            job.export_id.clone(),
            Registration {
                id,
                handle,
                running,
            },
        );

        if run_now {
            let key = run_now_key(&job.export_id);
            if let Some(previous) = registrations.remove(&key) {
                previous.handle.abort();
            }

            let id = self.next_registration_id();
            let scheduler = self.clone();
            let registered_key = key.clone();
            let handle = tokio::spawn(async move {
                let Ok(_permit) = scheduler.inner.supervisors.clone().acquire_owned().await else {
                    return;
                };
                scheduler.deregister(&registered_key, id);
                scheduler.run_cycle(job_id).await;
            })
            .abort_handle();

            registrations.insert(
                key,
                Registration {
                    id,
                    handle,
                    running: Arc::new(AtomicBool::new(false)),
                },
            );
        }

        info!(
            "Scheduled {} job {} every {:?}{}",
            job.job_type,
            job.export_id,
            schedule.period,
            if run_now { " (running now)" } else { "" }
        );
        Ok(())
    }

    /// Drop a job's recurring and immediate triggers
    ///
    /// A cycle that already started keeps running.
    pub async fn remove_job(&self, job_id: i64) -> Result<(), SchedulerError> {
        let job = repository::job::get(&self.inner.services.store, job_id).await?;
        let mut registrations = self.lock_registrations()?;

        for key in [job.export_id.clone(), run_now_key(&job.export_id)] {
            if let Some(registration) = registrations.remove(&key) {
                registration.handle.abort();
                debug!("Removed trigger {}", key);
            }
        }
        Ok(())
    }

    /// Re-register a job, picking up its current frequency
    ///
    /// Does nothing for a job that is not registered.
    pub async fn update_job(&self, job_id: i64) -> Result<(), SchedulerError> {
        let job = repository::job::get(&self.inner.services.store, job_id).await?;
        let registered = self.lock_registrations()?.contains_key(&job.export_id);

        if registered {
            self.remove_job(job_id).await?;
            self.add_job(job_id, true).await?;
        }
        Ok(())
    }

    /// Replace every registration with one recurring trigger per persisted job
    pub async fn refresh_jobs(&self) -> Result<(), SchedulerError> {
        {
            let mut registrations = self.lock_registrations()?;
            for (_, registration) in registrations.drain() {
                registration.handle.abort();
            }
        }

        let jobs = repository::job::list_all(&self.inner.services.store).await?;
        info!("Registering {} jobs", jobs.len());

        for job in jobs {
            self.add_job(job.id, false).await?;
        }
        Ok(())
    }

    /// Register a one-shot trigger that runs an execution on the executions pool
    ///
    /// An execution that cannot get a slot within the schedule timeout ends
    /// with `ExecutionScheduleTimeout`.
    pub async fn add_execution(&self, execution_id: i64) -> Result<(), SchedulerError> {
        let execution = repository::execution::get(&self.inner.services.store, execution_id).await?;
        let key = execution.external_id;

        let mut registrations = self.lock_registrations()?;
        if registrations.contains_key(&key) {
            debug!("Execution {} is already registered", key);
            return Ok(());
        }

        let id = self.next_registration_id();
        let scheduler = self.clone();
        let registered_key = key.clone();
        let handle = tokio::spawn(async move {
            scheduler.fire_execution(&registered_key, id, execution_id).await;
            scheduler.inner.execution_stopped.notify_waiters();
        })
        .abort_handle();

        registrations.insert(
            key,
            Registration {
                id,
                handle,
                running: Arc::new(AtomicBool::new(false)),
            },
        );
        Ok(())
    }

    /// Cancel an execution that has not started and optionally close it out
    ///
    /// With a status the execution is given that status and an end
    /// timestamp, whether or not a trigger was still registered.
    pub async fn remove_execution(
        &self,
        execution_id: i64,
        status: Option<StatusCode>,
    ) -> Result<(), SchedulerError> {
        let store = &self.inner.services.store;
        let execution = repository::execution::get(store, execution_id).await?;

        let removed = self
            .inner
            .registrations
            .lock()
            .map(|mut registrations| registrations.remove(&execution.external_id))
            .unwrap_or_default();
        if let Some(registration) = removed {
            registration.handle.abort();
            debug!("Removed trigger of execution {}", execution.external_id);
        }

        if let Some(status) = status {
            repository::execution::set_status(store, execution_id, status).await?;
            if execution.ended_at.is_none() {
                repository::execution::set_ended(store, execution_id, Utc::now()).await?;
            }
            self.inner.execution_stopped.notify_waiters();
        }
        Ok(())
    }

    /// Stop accepting work and drop every registration
    ///
    /// Cycles and executions already holding a pool slot run to completion.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        self.inner.supervisors.close();
        self.inner.executions.close();

        let drained: Vec<_> = match self.inner.registrations.lock() {
            Ok(mut registrations) => registrations.drain().collect(),
            Err(poisoned) => poisoned.into_inner().drain().collect(),
        };
        for (_, registration) in &drained {
            registration.handle.abort();
        }
        info!("Scheduler shut down, dropped {} triggers", drained.len());
    }

    /// Keys of every live registration, sorted
    pub fn registered_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .registrations
            .lock()
            .map(|registrations| registrations.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    // ========================================================================
    // Firing
    // ========================================================================

    async fn fire_job(&self, job_id: i64) {
        let Ok(_permit) = self.inner.supervisors.clone().acquire_owned().await else {
            return;
        };
        self.run_cycle(job_id).await;
    }

    async fn run_cycle(&self, job_id: i64) {
        match supervisor::run_job_cycle(self, job_id).await {
            Ok(outcome) => debug!("Job {} cycle finished: {:?}", job_id, outcome),
            Err(e) => error!("Job {} cycle failed: {}", job_id, e),
        }
    }

    async fn fire_execution(&self, key: &str, registration_id: u64, execution_id: i64) {
        let timeout = self.inner.services.config.schedule_timeout;
        let permit =
            tokio::time::timeout(timeout, self.inner.executions.clone().acquire_owned()).await;

        match permit {
            Ok(Ok(_permit)) => {
                // Past this point the execution can no longer be cancelled
                self.deregister(key, registration_id);
                if let Err(e) = runner::run(self.inner.services.clone(), execution_id).await {
                    error!("Execution {} failed: {}", key, e);
                }
            }
            Ok(Err(_)) => {
                self.deregister(key, registration_id);
                debug!("Execution {} dropped at shutdown", key);
            }
            Err(_) => {
                self.deregister(key, registration_id);
                warn!(
                    "Execution {} could not get a slot within {:?}",
                    key, timeout
                );
                self.mark_schedule_timeout(execution_id).await;
            }
        }
    }

    async fn mark_schedule_timeout(&self, execution_id: i64) {
        let store = &self.inner.services.store;
        let result = async {
            repository::execution::set_status(store, execution_id, StatusCode::ExecutionScheduleTimeout)
                .await?;
            repository::execution::set_ended(store, execution_id, Utc::now()).await
        }
        .await;

        if let Err(e) = result {
            error!(
                "Failed to record schedule timeout of execution {}: {}",
                execution_id, e
            );
        }
    }

    // ========================================================================
    // Registrations
    // ========================================================================

    fn lock_registrations(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, Registration>>, SchedulerError> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }
        Ok(self
            .inner
            .registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Remove a registration unless it was replaced in the meantime
    fn deregister(&self, key: &str, registration_id: u64) {
        let mut registrations = self
            .inner
            .registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if registrations
            .get(key)
            .is_some_and(|registration| registration.id == registration_id)
        {
            registrations.remove(key);
        }
    }

    fn next_registration_id(&self) -> u64 {
        self.inner.next_registration.fetch_add(1, Ordering::Relaxed)
    }
}
