//! Execution domain types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::status::StatusCode;
use super::task::TaskKind;

/// One run of one task within one job run cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: i64,
    /// Externally visible identity, also the one-shot trigger key
    pub external_id: String,
    pub job_id: i64,
    pub run_cycle_id: i64,
    pub task: TaskKind,
    pub status: StatusCode,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Task output, plus `exception` once the task failed
    pub details: Value,
}

impl Execution {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Recorded failure, if any
    pub fn exception(&self) -> Option<ExceptionDetails> {
        self.details
            .get(ExceptionDetails::KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Wall-clock runtime, once both timestamps are set
    pub fn runtime_seconds(&self) -> Option<f64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// Failure recorded in an execution's details under `exception`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub exception_type: Option<String>,
    pub exception_message: Option<String>,
}

impl ExceptionDetails {
    pub const KEY: &'static str = "exception";

    pub fn new(exception_type: impl Into<String>, exception_message: impl Into<String>) -> Self {
        Self {
            exception_type: Some(exception_type.into()),
            exception_message: Some(exception_message.into()),
        }
    }

    /// Details a fresh execution starts with: an empty exception slot
    pub fn initial_details() -> Value {
        serde_json::json!({ "exception": ExceptionDetails::default() })
    }
}
