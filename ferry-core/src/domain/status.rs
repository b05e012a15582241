//! Execution status taxonomy
//!
//! Every status stored on an execution is one of the codes below. The numeric
//! value is what gets persisted; ranges carry meaning:
//!
//! - `100..=199` errors: the execution failed
//! - `200..=290` terminal-neutral and bookkeeping states
//! - `300..=399` in progress; `310..` are stage markers used for narration only

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder replaced with the failing error's type name when rendering messages
pub const EXCEPTION_TYPE_PLACEHOLDER: &str = "{exceptionType}";

macro_rules! status_codes {
    ($( $variant:ident = $code:literal => $message:literal, )+) => {
        /// Closed table of execution status codes
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "i32", try_from = "i32")]
        #[repr(i32)]
        pub enum StatusCode {
            $( $variant = $code, )+
        }

        impl StatusCode {
            /// All known codes, in ascending numeric order
            pub const ALL: &'static [StatusCode] = &[$( StatusCode::$variant, )+];

            /// Looks up a code by its persisted integer value
            pub fn from_code(code: i32) -> Option<Self> {
                match code {
                    $( $code => Some(StatusCode::$variant), )+
                    _ => None,
                }
            }

            /// Symbolic name, e.g. `"Completed"`
            pub fn name(self) -> &'static str {
                match self {
                    $( StatusCode::$variant => stringify!($variant), )+
                }
            }

            /// Looks up a code by its symbolic name
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $( stringify!($variant) => Some(StatusCode::$variant), )+
                    _ => None,
                }
            }

            /// Human readable message template
            pub fn message(self) -> &'static str {
                match self {
                    $( StatusCode::$variant => $message, )+
                }
            }
        }
    };
}

status_codes! {
    // Execution errors
    ExecutionScheduleTimeout = 101 => "Task could not be scheduled to run (either because it is already running or there are not enough execution slots available)",
    ExecutionNotComplete = 102 => "Task could not complete (likely due to export service shutdown or crash)",
    ExecutionRunTimeout = 103 => "Task ran over the allotted time and was cancelled",

    // Container registry errors
    ContainerError = 110 => "An unexpected container engine error has occurred",
    ContainerApiError = 111 => "A container engine API error has occurred",
    ContainerNotFound = 112 => "The container client was not able to find the requested resource or image",
    ContainerImageNotFound = 113 => "The container client was not able to find the requested image",
    ContainerInvalidRepository = 115 => "The container client requested access to an invalid repository",
    ContainerBuildError = 116 => "There was an error with the container image build",

    // Export API validation errors
    ExportApiMalformedJson = 130 => "The input supplied is invalid: malformed JSON",
    ExportApiProjectNotExist = 131 => "The input supplied is invalid: specified project does not exist",
    ExportApiProjectNoAccess = 132 => "Specified platform API key does not have permission to the specified project",
    ExportApiExportNameConflict = 133 => "Specified export group name and project name are already being exported as part of another export job",
    ExportApiProjectNameConflict = 134 => "Specified platform owner and project are already being exported as part of another export job",
    ExportApiExportIdNotExist = 135 => "Specified export ID does not exist",
    ExportApiInvalidExportGroupName = 136 => "Export group name is invalid: name components may contain lowercase letters, digits and separators. A separator is defined as a period, one or two underscores, or one or more dashes. A name component may not start or end with a separator.",
    ExportApiInvalidExportProjectName = 137 => "Export project name is invalid: name components may contain lowercase letters, digits and separators. A separator is defined as a period, one or two underscores, or one or more dashes. A name component may not start or end with a separator.",

    // Store errors
    InvalidJobRunId = 170 => "Specified job run ID is invalid",

    UnknownError = 199 => "An unexpected error has occurred: {exceptionType}",

    // Terminal-neutral
    Skipped = 200 => "No action required",
    Disabled = 205 => "Execution was skipped because job is disabled",
    Initializing = 210 => "Execution has been created",
    Scheduled = 220 => "Execution is scheduled to run",
    Completed = 290 => "Execution has completed",

    Running = 300 => "Execution is running",

    // Project file export stages
    ProjectFileExportInitiated = 310 => "Project file export has initiated",
    ProjectFileDeletePriorStarted = 311 => "Started to cleanup the old project file export prior folder",
    ProjectFileDeletePriorEnded = 312 => "Finished cleaning up the old project file export prior folder",
    ProjectFileMoveLatestToPriorStarted = 313 => "Started to move the old project file export latest folder to the prior folder",
    ProjectFileMoveLatestToPriorEnded = 314 => "Finished moving the old project file export latest folder to the prior folder",
    ProjectFileTransferStarted = 315 => "Started to export the project files to the latest folder",
    ProjectFileTransferEnded = 316 => "Finished exporting the project files to the latest folder",

    // Project image export stages
    ImageExportInitiated = 330 => "Container image export has initiated",
    ImageExportPullStarted = 331 => "Container image for export is being pulled",
    ImageExportPullEnded = 332 => "Container image for export has been pulled",
    ImageExportBuildStarted = 333 => "Container image for export is being built",
    ImageExportBuildEnded = 334 => "Container image for export has been built",
    ImageExportPushStarted = 335 => "Container image for export is being pushed",
    ImageExportPushEnded = 336 => "Container image for export has been pushed",
}

impl StatusCode {
    /// Persisted integer value
    pub fn code(self) -> i32 {
        self as i32
    }

    /// The execution failed
    pub fn is_error(self) -> bool {
        is_error_code(self.code())
    }

    /// The execution is still in flight (scheduled, running or at a stage marker)
    pub fn is_active(self) -> bool {
        is_active_code(self.code())
    }

    pub fn is_skip(self) -> bool {
        self == StatusCode::Skipped
    }

    pub fn is_disabled(self) -> bool {
        self == StatusCode::Disabled
    }

    /// Renders the message template, filling the exception type placeholder
    ///
    /// Without an exception type the placeholder is replaced by `"unknown"`.
    pub fn render_message(self, exception_type: Option<&str>) -> String {
        self.message()
            .replace(EXCEPTION_TYPE_PLACEHOLDER, exception_type.unwrap_or("unknown"))
    }
}

/// Error predicate over a raw persisted code
pub fn is_error_code(code: i32) -> bool {
    code <= StatusCode::UnknownError.code()
}

/// Active predicate over a raw persisted code
///
/// Used in store queries, so it must agree with the SQL filter
/// `status > 210 AND status != 290`.
pub fn is_active_code(code: i32) -> bool {
    code > StatusCode::Initializing.code() && code != StatusCode::Completed.code()
}

impl From<StatusCode> for i32 {
    fn from(status: StatusCode) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for StatusCode {
    type Error = UnknownStatusCode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        StatusCode::from_code(code).ok_or(UnknownStatusCode(code))
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// A persisted status value outside the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownStatusCode(pub i32);

impl fmt::Display for UnknownStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status code {}", self.0)
    }
}

impl std::error::Error for UnknownStatusCode {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_integer() {
        for status in StatusCode::ALL {
            assert_eq!(StatusCode::from_code(status.code()), Some(*status));
            assert_eq!(StatusCode::from_name(status.name()), Some(*status));
        }
        assert_eq!(StatusCode::from_code(104), None);
    }

    #[test]
    fn test_error_band() {
        assert!(StatusCode::ExecutionRunTimeout.is_error());
        assert!(StatusCode::ContainerBuildError.is_error());
        assert!(StatusCode::UnknownError.is_error());
        assert!(!StatusCode::Skipped.is_error());
        assert!(!StatusCode::Running.is_error());
    }

    #[test]
    fn test_active_predicate() {
        assert!(StatusCode::Scheduled.is_active());
        assert!(StatusCode::Running.is_active());
        assert!(StatusCode::ImageExportPushStarted.is_active());
        assert!(!StatusCode::Initializing.is_active());
        assert!(!StatusCode::Completed.is_active());
        assert!(!StatusCode::Skipped.is_active());
        assert!(!StatusCode::Disabled.is_active());
        assert!(!StatusCode::UnknownError.is_active());
    }

    #[test]
    fn test_stage_codes_are_running_not_terminal() {
        let stage = StatusCode::ProjectFileTransferStarted;
        assert!(stage.code() > StatusCode::Running.code());
        assert!(stage.is_active());
        assert!(!stage.is_error());
    }

    #[test]
    fn test_render_message_fills_exception_type() {
        let rendered = StatusCode::UnknownError.render_message(Some("PlatformNotFound"));
        assert_eq!(rendered, "An unexpected error has occurred: PlatformNotFound");

        let plain = StatusCode::Completed.render_message(Some("ignored"));
        assert_eq!(plain, "Execution has completed");
    }

    #[test]
    fn test_serializes_as_integer() {
        let json = serde_json::to_string(&StatusCode::Skipped).unwrap();
        assert_eq!(json, "200");

        let parsed: StatusCode = serde_json::from_str("290").unwrap();
        assert_eq!(parsed, StatusCode::Completed);

        assert!(serde_json::from_str::<StatusCode>("42").is_err());
    }
}
