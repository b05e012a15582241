//! Store access
//!
//! Repositories are free functions over a [`Store`]. Every statement runs
//! through the retry wrapper; secrets and details columns are encrypted.

pub mod claim;
pub mod execution;
pub mod job;
pub mod job_run;
pub mod metric;
pub mod retry;

use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cipher::{Cipher, CipherError};
pub use retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Shared handle to the database
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    retry: RetryPolicy,
    cipher: Arc<dyn Cipher>,
    /// Serializes read-modify-write of job details within this process
    details_lock: Arc<Mutex<()>>,
}

impl Store {
    pub fn new(pool: SqlitePool, retry: RetryPolicy, cipher: Arc<dyn Cipher>) -> Self {
        Self {
            pool,
            retry,
            cipher,
            details_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs one store operation under the retry policy
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        retry::with_retry(&self.retry, operation, op)
            .await
            .map_err(StoreError::from)
    }

    pub(crate) fn seal(&self, plaintext: &str) -> Result<String, StoreError> {
        Ok(self.cipher.encrypt(plaintext)?)
    }

    pub(crate) fn open(&self, ciphertext: &str) -> Result<String, StoreError> {
        Ok(self.cipher.decrypt(ciphertext)?)
    }

    pub(crate) fn seal_json(&self, value: &serde_json::Value) -> Result<String, StoreError> {
        self.seal(&serde_json::to_string(value)?)
    }

    pub(crate) fn open_json(&self, ciphertext: &str) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::from_str(&self.open(ciphertext)?)?)
    }

    pub(crate) fn details_lock(&self) -> &Mutex<()> {
        &self.details_lock
    }
}
