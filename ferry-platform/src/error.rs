//! Error types for the platform client

use thiserror::Error;

/// Result type alias for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Errors raised by the platform API
///
/// The set is closed: callers translate each variant into an execution
/// status without inspecting messages.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The API key is not recognised (the caller is anonymous)
    #[error("Platform API key is invalid")]
    KeyInvalid,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The project's selected compute environment revision has no image
    #[error("Compute environment revision is not available")]
    ComputeEnvironmentRevisionNotAvailable,

    /// Any other non-success response
    #[error("Platform API gave HTTP response status code {status} with message '{message}'")]
    Unexpected { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl PlatformError {
    /// Symbolic kind name recorded with a failed execution
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::KeyInvalid => "PlatformApiKeyInvalid",
            Self::Unauthorized(_) => "PlatformApiUnauthorized",
            Self::NotFound(_) => "PlatformApiNotFound",
            Self::BadRequest(_) => "PlatformApiBadRequest",
            Self::ComputeEnvironmentRevisionNotAvailable => {
                "PlatformApiComputeEnvironmentRevisionNotAvailable"
            }
            Self::Unexpected { .. } => "PlatformApiUnexpectedError",
            Self::RequestFailed(_) => "PlatformApiRequestFailed",
            Self::ParseError(_) => "PlatformApiParseError",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Classifies a failed response
    ///
    /// Some endpoints report missing or forbidden resources as a 500 with a
    /// recognisable message, so the body is inspected for those.
    pub fn from_response(status: u16, body: &str, resource: &str) -> Self {
        match status {
            404 => Self::NotFound(format!("{} not found", resource)),
            403 => Self::Unauthorized(format!("not authorized to access {}", resource)),
            400 => Self::BadRequest(body.to_string()),
            500 if is_missing_body(body) => Self::NotFound(format!("{} not found", resource)),
            500 if is_forbidden_body(body) => {
                Self::Unauthorized(format!("not authorized to access {}", resource))
            }
            _ => Self::Unexpected {
                status,
                message: body.to_string(),
            },
        }
    }
}

fn is_missing_body(body: &str) -> bool {
    body.contains("NoSuchElementException: key not found")
        || body.contains("Invalid remote: origin")
        || (body.contains("Environment ") && body.contains(" does not exist"))
}

fn is_forbidden_body(body: &str) -> bool {
    body.contains("Don't recognize principal AnonymousPrincipal")
        || body.contains("is not allowed to view environment")
}
