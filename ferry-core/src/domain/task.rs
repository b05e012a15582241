//! Job types and the task kinds they fan out into

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of recurring job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    /// Export one hosted project's files and container image
    ProjectExport,
    /// Write a summary of every project export's latest state
    AllExportStatusReport,
    HealthMetricsCollection,
    DatabasePrune,
}

/// Kind of work a single execution performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    ProjectFilesExport,
    ProjectImageExport,
    ProjectExportReport,
    AllExportsStatusReport,
    HealthMetricsCollection,
    DatabasePrune,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::ProjectExport,
        JobType::AllExportStatusReport,
        JobType::HealthMetricsCollection,
        JobType::DatabasePrune,
    ];

    /// Job types the service creates for itself at start-up
    pub const SERVICE: [JobType; 3] = [
        JobType::AllExportStatusReport,
        JobType::HealthMetricsCollection,
        JobType::DatabasePrune,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::ProjectExport => "ProjectExport",
            JobType::AllExportStatusReport => "AllExportStatusReport",
            JobType::HealthMetricsCollection => "HealthMetricsCollection",
            JobType::DatabasePrune => "DatabasePrune",
        }
    }

    /// Ordered task groups run during one cycle
    ///
    /// Groups run one after another with a barrier in between; tasks inside a
    /// group may run concurrently. Later groups may read earlier groups' output.
    pub fn task_groups(self) -> &'static [&'static [TaskKind]] {
        match self {
            JobType::ProjectExport => &[
                &[TaskKind::ProjectFilesExport, TaskKind::ProjectImageExport],
                &[TaskKind::ProjectExportReport],
            ],
            JobType::AllExportStatusReport => &[&[TaskKind::AllExportsStatusReport]],
            JobType::HealthMetricsCollection => &[&[TaskKind::HealthMetricsCollection]],
            JobType::DatabasePrune => &[&[TaskKind::DatabasePrune]],
        }
    }

    pub fn is_service(self) -> bool {
        self != JobType::ProjectExport
    }
}

impl TaskKind {
    const ALL: [TaskKind; 6] = [
        TaskKind::ProjectFilesExport,
        TaskKind::ProjectImageExport,
        TaskKind::ProjectExportReport,
        TaskKind::AllExportsStatusReport,
        TaskKind::HealthMetricsCollection,
        TaskKind::DatabasePrune,
    ];

    /// Name used for the `execution_type` column and as the `taskState` key
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::ProjectFilesExport => "ProjectFilesExportTask",
            TaskKind::ProjectImageExport => "ProjectImageExportTask",
            TaskKind::ProjectExportReport => "ProjectExportReportTask",
            TaskKind::AllExportsStatusReport => "AllExportsStatusReportTask",
            TaskKind::HealthMetricsCollection => "HealthMetricsCollectionTask",
            TaskKind::DatabasePrune => "DatabasePruneTask",
        }
    }
}

/// A type name that does not belong to the closed set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for JobType {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

impl FromStr for TaskKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_export_groups_are_ordered() {
        let groups = JobType::ProjectExport.task_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0],
            &[TaskKind::ProjectFilesExport, TaskKind::ProjectImageExport]
        );
        assert_eq!(groups[1], &[TaskKind::ProjectExportReport]);
    }

    #[test]
    fn test_every_job_type_has_tasks() {
        for job_type in JobType::ALL {
            assert!(job_type.task_groups().iter().all(|g| !g.is_empty()));
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "ProjectExport".parse::<JobType>().unwrap(),
            JobType::ProjectExport
        );
        assert_eq!(
            "ProjectFilesExportTask".parse::<TaskKind>().unwrap(),
            TaskKind::ProjectFilesExport
        );
        assert!("Nope".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_service_job_types() {
        assert!(!JobType::ProjectExport.is_service());
        assert!(JobType::SERVICE.iter().all(|t| t.is_service()));
    }
}
