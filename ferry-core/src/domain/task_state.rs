//! Job details document and the per-task idempotency markers inside it
//!
//! A job's details are a JSON object. Besides job-type specific settings it
//! carries a `taskState` object keyed by task name:
//!
//! ```json
//! { "taskState": { "ProjectFilesExportTask": { "lastCompletedExecutionId": 7, "commitId": "abc" } },
//!   "dockerBuildTemplateFile": "default.Dockerfile" }
//! ```
//!
//! Only the shape is known here; the fingerprint fields belong to each task.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::task::TaskKind;

pub const TASK_STATE_KEY: &str = "taskState";
pub const LAST_COMPLETED_EXECUTION_ID: &str = "lastCompletedExecutionId";

/// Job details document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobDetails(Map<String, Value>);

/// A merge into one task's state entry
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStateUpdate {
    pub task: TaskKind,
    pub fields: Map<String, Value>,
}

impl TaskStateUpdate {
    pub fn new(task: TaskKind) -> Self {
        Self {
            task,
            fields: Map::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Marks `execution_id` as the execution whose output is current
    pub fn completed_by(self, execution_id: i64) -> Self {
        self.field(LAST_COMPLETED_EXECUTION_ID, execution_id)
    }

    /// Adds every field of a fingerprint
    pub fn fingerprint(mut self, fingerprint: &Map<String, Value>) -> Self {
        for (key, value) in fingerprint {
            self.fields.insert(key.clone(), value.clone());
        }
        self
    }
}

impl JobDetails {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value; anything other than an object yields empty details
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Top-level job setting (e.g. `dockerBuildTemplateFile`)
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// State entry of one task, if the task ever recorded one
    pub fn task_state(&self, task: TaskKind) -> Option<&Map<String, Value>> {
        self.0
            .get(TASK_STATE_KEY)
            .and_then(Value::as_object)
            .and_then(|states| states.get(task.as_str()))
            .and_then(Value::as_object)
    }

    pub fn last_completed_execution_id(&self, task: TaskKind) -> Option<i64> {
        self.task_state(task)
            .and_then(|state| state.get(LAST_COMPLETED_EXECUTION_ID))
            .and_then(Value::as_i64)
    }

    /// Boolean marker scoped to one task, false when absent
    pub fn task_flag(&self, task: TaskKind, key: &str) -> bool {
        self.task_state(task)
            .and_then(|state| state.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// True when a state entry exists and holds every fingerprint field unchanged
    ///
    /// A missing entry or missing field never matches, so "never exported" is
    /// distinct from any recorded value, null included.
    pub fn fingerprint_matches(&self, task: TaskKind, fingerprint: &Map<String, Value>) -> bool {
        match self.task_state(task) {
            Some(state) => fingerprint
                .iter()
                .all(|(key, value)| state.get(key) == Some(value)),
            None => false,
        }
    }

    /// Merges fields into one task's entry, creating it when absent
    pub fn merge_task_state(&mut self, task: TaskKind, fields: &Map<String, Value>) {
        let states = self
            .0
            .entry(TASK_STATE_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        if !states.is_object() {
            *states = Value::Object(Map::new());
        }

        if let Value::Object(states) = states {
            let entry = states
                .entry(task.as_str().to_string())
                .or_insert_with(|| Value::Object(Map::new()));

            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }

            if let Value::Object(entry) = entry {
                for (key, value) in fields {
                    entry.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Applies a batch of updates in order
    pub fn apply(&mut self, updates: &[TaskStateUpdate]) {
        for update in updates {
            self.merge_task_state(update.task, &update.fields);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fingerprint(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_merge_creates_and_updates_entries() {
        let mut details = JobDetails::from_value(json!({ "dockerBuildTemplateFile": "a" }));

        details.apply(&[TaskStateUpdate::new(TaskKind::ProjectFilesExport)
            .completed_by(3)
            .field("commitId", "abc")]);
        details.apply(&[TaskStateUpdate::new(TaskKind::ProjectFilesExport).field("commitId", "def")]);

        assert_eq!(
            details.last_completed_execution_id(TaskKind::ProjectFilesExport),
            Some(3)
        );
        assert_eq!(
            details.task_state(TaskKind::ProjectFilesExport).unwrap()["commitId"],
            json!("def")
        );
        assert_eq!(details.get_str("dockerBuildTemplateFile"), Some("a"));
    }

    #[test]
    fn test_fingerprint_requires_recorded_state() {
        let details = JobDetails::new();
        let fp = fingerprint(json!({ "commitId": null }));
        assert!(!details.fingerprint_matches(TaskKind::ProjectFilesExport, &fp));
    }

    #[test]
    fn test_fingerprint_matches_recorded_values() {
        let mut details = JobDetails::new();
        details.apply(&[TaskStateUpdate::new(TaskKind::ProjectImageExport)
            .field("computeEnvironmentId", "env1")
            .field("computeEnvironmentRevision", 4)]);

        let same = fingerprint(json!({ "computeEnvironmentId": "env1", "computeEnvironmentRevision": 4 }));
        let changed = fingerprint(json!({ "computeEnvironmentId": "env1", "computeEnvironmentRevision": 5 }));

        assert!(details.fingerprint_matches(TaskKind::ProjectImageExport, &same));
        assert!(!details.fingerprint_matches(TaskKind::ProjectImageExport, &changed));
    }

    #[test]
    fn test_task_flag_defaults_to_false() {
        let mut details = JobDetails::new();
        assert!(!details.task_flag(TaskKind::ProjectExportReport, "statusSaved"));

        details.apply(&[TaskStateUpdate::new(TaskKind::ProjectExportReport).field("statusSaved", true)]);
        assert!(details.task_flag(TaskKind::ProjectExportReport, "statusSaved"));
    }

    #[test]
    fn test_non_object_task_state_is_replaced() {
        let mut details = JobDetails::from_value(json!({ "taskState": "garbage" }));
        details.apply(&[TaskStateUpdate::new(TaskKind::DatabasePrune).completed_by(1)]);
        assert_eq!(details.last_completed_execution_id(TaskKind::DatabasePrune), Some(1));
    }
}
