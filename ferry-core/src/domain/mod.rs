//! Core domain types
//!
//! The business entities shared by the exporter's store, scheduler and
//! task bodies.

pub mod execution;
pub mod job;
pub mod job_run;
pub mod metric;
pub mod status;
pub mod task;
pub mod task_state;

pub use execution::{ExceptionDetails, Execution};
pub use job::{JobDefinition, Secret};
pub use job_run::JobRunLink;
pub use metric::HealthMetric;
pub use status::StatusCode;
pub use task::{JobType, TaskKind};
pub use task_state::{JobDetails, TaskStateUpdate};
