//! Failures a task body can raise
//!
//! Every variant maps to exactly one status code; the match in
//! [`TaskError::status_code`] is exhaustive, so adding a variant without a
//! code does not compile.

use ferry_core::domain::StatusCode;
use ferry_platform::PlatformError;
use thiserror::Error;

use crate::integrations::{RegistryError, StorageError};
use crate::repository::StoreError;
use crate::service::reporting::ReportingError;
use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ReportingError> for TaskError {
    fn from(err: ReportingError) -> Self {
        match err {
            ReportingError::Store(e) => TaskError::Store(e),
            ReportingError::Template(e) => TaskError::Template(e),
        }
    }
}

impl TaskError {
    /// Status code an execution ends with after this failure
    pub fn status_code(&self) -> StatusCode {
        match self {
            TaskError::Registry(e) => match e {
                RegistryError::Api(_) => StatusCode::ContainerApiError,
                RegistryError::NotFound(_) => StatusCode::ContainerNotFound,
                RegistryError::ImageNotFound(_) => StatusCode::ContainerImageNotFound,
                RegistryError::InvalidRepository(_) => StatusCode::ContainerInvalidRepository,
                RegistryError::Build(_) => StatusCode::ContainerBuildError,
                RegistryError::Engine(_) => StatusCode::ContainerError,
            },
            TaskError::Platform(_)
            | TaskError::Storage(_)
            | TaskError::Store(_)
            | TaskError::Template(_)
            | TaskError::Config(_)
            | TaskError::Serialization(_) => StatusCode::UnknownError,
        }
    }

    /// Exception type persisted in `details.exception.exceptionType`
    pub fn kind_name(&self) -> &'static str {
        match self {
            TaskError::Platform(e) => e.kind_name(),
            TaskError::Registry(e) => e.kind_name(),
            TaskError::Storage(e) => e.kind_name(),
            TaskError::Store(_) => "StoreError",
            TaskError::Template(_) => "TemplateError",
            TaskError::Config(_) => "ConfigurationError",
            TaskError::Serialization(_) => "SerializationError",
        }
    }
}
