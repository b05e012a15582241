//! Job run link types

use serde::{Deserialize, Serialize};

use super::task::TaskKind;

/// Ties one `(job, run cycle, task)` to its execution
///
/// `last_successful_execution_id` points at the execution whose output is
/// still authoritative: this cycle's execution when it did the work, or an
/// earlier one when this cycle skipped as unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRunLink {
    pub id: i64,
    pub job_id: i64,
    pub run_cycle_id: i64,
    pub task: TaskKind,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub associated_execution_id: i64,
    pub last_successful_execution_id: Option<i64>,
}

impl JobRunLink {
    /// This cycle's execution performed the work itself
    pub fn ran_this_cycle(&self) -> bool {
        self.last_successful_execution_id == Some(self.associated_execution_id)
    }
}
