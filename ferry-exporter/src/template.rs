//! `{name}` placeholder rendering for export locations and image names

use ferry_core::domain::JobDefinition;
use thiserror::Error;

use crate::config::ExportTemplates;

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("Template '{template}' references unknown placeholder '{{{name}}}'")]
    UnknownPlaceholder { template: String, name: String },

    #[error("Job {0} has no project to export")]
    NotAProjectJob(String),
}

/// Replaces every `{name}` with its value
///
/// A placeholder with no value is an error, so a typo in a configured
/// template fails the execution instead of writing to a literal path.
pub fn render(template: &str, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                let value = vars
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| TemplateError::UnknownPlaceholder {
                        template: template.to_string(),
                        name: name.to_string(),
                    })?;
                rendered.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                rendered.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    rendered.push_str(rest);
    Ok(rendered)
}

/// Object store locations of one project export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportLocations {
    pub base: String,
    pub latest: String,
    pub prior: String,
    pub sync_log: String,
}

impl ExportLocations {
    pub fn resolve(
        templates: &ExportTemplates,
        bucket: &str,
        job: &JobDefinition,
    ) -> Result<Self, TemplateError> {
        let names = ProjectNames::of(job)?;
        let mut vars = names.vars();
        vars.push(("bucket", bucket));

        let base = render(&templates.export_path, &vars)?;
        vars.push(("export_path", &base));

        Ok(Self {
            latest: render(&templates.export_latest, &vars)?,
            prior: render(&templates.export_prior, &vars)?,
            sync_log: render(&templates.sync_log_path, &vars)?,
            base: base.clone(),
        })
    }
}

/// Target image references of one project's compute environment
#[derive(Debug, Clone, PartialEq)]
pub struct ImageNames {
    pub latest: String,
    pub version: String,
}

impl ImageNames {
    /// Image references are lowercased as registries require
    pub fn resolve(
        templates: &ExportTemplates,
        registry: &str,
        job: &JobDefinition,
        environment_id: &str,
        environment_revision: i64,
    ) -> Result<Self, TemplateError> {
        let names = ProjectNames::of(job)?.lowercase();
        let environment_id = environment_id.to_lowercase();
        let revision = environment_revision.to_string();

        let mut vars = names.vars();
        vars.push(("registry", registry));
        vars.push(("environment_id", &environment_id));
        vars.push(("environment_revision", &revision));

        Ok(Self {
            latest: render(&templates.image_latest, &vars)?,
            version: render(&templates.image_version, &vars)?,
        })
    }
}

/// Path of the all-exports summary
pub fn exports_summary_path(templates: &ExportTemplates, bucket: &str) -> Result<String, TemplateError> {
    render(&templates.exports_summary_path, &[("bucket", bucket)])
}

struct ProjectNames {
    owner: String,
    project: String,
    export_group: String,
    export_project: String,
}

impl ProjectNames {
    fn of(job: &JobDefinition) -> Result<Self, TemplateError> {
        match (&job.owner, &job.project, &job.export_group, &job.export_project) {
            (Some(owner), Some(project), Some(group), Some(export_project)) => Ok(Self {
                owner: owner.clone(),
                project: project.clone(),
                export_group: group.clone(),
                export_project: export_project.clone(),
            }),
            _ => Err(TemplateError::NotAProjectJob(job.export_id.clone())),
        }
    }

    fn lowercase(self) -> Self {
        Self {
            owner: self.owner.to_lowercase(),
            project: self.project.to_lowercase(),
            export_group: self.export_group.to_lowercase(),
            export_project: self.export_project.to_lowercase(),
        }
    }

    fn vars(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("owner", self.owner.as_str()),
            ("project", self.project.as_str()),
            ("export_group", self.export_group.as_str()),
            ("export_project", self.export_project.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::domain::{JobDetails, JobType};

    fn job() -> JobDefinition {
        JobDefinition {
            id: 1,
            export_id: "exp-1".to_string(),
            job_type: JobType::ProjectExport,
            owner: Some("Alice".to_string()),
            project: Some("Churn".to_string()),
            export_group: Some("Analytics".to_string()),
            export_project: Some("churn-model".to_string()),
            active: true,
            run_frequency_seconds: 3600,
            secrets: None,
            details: JobDetails::new(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_render_placeholders() {
        let out = render("{a}/x/{b}", &[("a", "1"), ("b", "2")]).unwrap();
        assert_eq!(out, "1/x/2");
        assert_eq!(render("no braces", &[]).unwrap(), "no braces");
        assert_eq!(render("open { only", &[]).unwrap(), "open { only");
    }

    #[test]
    fn test_render_rejects_unknown_placeholder() {
        let err = render("{bucket}/{nope}", &[("bucket", "b")]).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownPlaceholder {
                template: "{bucket}/{nope}".to_string(),
                name: "nope".to_string(),
            }
        );
    }

    #[test]
    fn test_export_locations_from_defaults() {
        let locations = ExportLocations::resolve(&ExportTemplates::default(), "exports", &job()).unwrap();
        assert_eq!(locations.base, "exports/Analytics/churn-model");
        assert_eq!(locations.latest, "exports/Analytics/churn-model/latest");
        assert_eq!(locations.prior, "exports/Analytics/churn-model/prior");
        assert_eq!(locations.sync_log, "exports/Analytics/churn-model/sync-log.json");
    }

    #[test]
    fn test_image_names_are_lowercased() {
        let names = ImageNames::resolve(
            &ExportTemplates::default(),
            "registry.local:5000",
            &job(),
            "5F0C",
            3,
        )
        .unwrap();
        assert_eq!(names.latest, "registry.local:5000/analytics/churn-model:latest");
        assert_eq!(names.version, "registry.local:5000/analytics/churn-model:5f0c-v3");
    }

    #[test]
    fn test_service_job_has_no_locations() {
        let mut service = job();
        service.owner = None;
        assert!(matches!(
            ExportLocations::resolve(&ExportTemplates::default(), "exports", &service),
            Err(TemplateError::NotAProjectJob(_))
        ));
    }
}
