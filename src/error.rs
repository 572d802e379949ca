//! Error types for the geoconvert-client library.
//!
//! Three error types reflect three distinct failure layers:
//!
//! * [`ServiceError`] — a single remote call failed at the transport or
//!   protocol level. Returned by every [`crate::service::ConversionBackend`]
//!   method and never shown to the user directly.
//!
//! * [`WorkflowError`] — the outcome of a controller operation
//!   (`select_file`, `select_format`, `convert`, `download`). Each remote
//!   failure is converted into exactly one of these at the step that raised
//!   it, carrying the user-facing message.
//!
//! * [`GeoConvertError`] — **Fatal**: the client cannot be set up at all
//!   (bad configuration, unreadable input file, broken preferences file).

use std::path::PathBuf;
use thiserror::Error;

/// A failure at the boundary to the remote conversion service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The server answered with a non-success status.
    ///
    /// `detail` holds the server's structured, already-localized user
    /// message when the response body carried one.
    #[error("server returned HTTP {status}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Rejected { status: u16, detail: Option<String> },

    /// The request never produced a response (DNS, connect, reset, timeout).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The response decoded but violates the protocol (e.g. unknown file type).
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// The server-supplied user message, if the failure carried one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ServiceError::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

/// Local precondition failures of `convert()`. Never reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("select a file first")]
    NoFile,
    #[error("select an output format first")]
    NoFormat,
}

/// Outcome of a workflow operation that did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    // ── Step failures (user-visible) ──────────────────────────────────────
    /// The file was rejected by the Type Detection Service.
    #[error("{message}")]
    Detection { message: String },

    /// `convert()` was called without a file or a format.
    #[error("{message}")]
    Validation {
        kind: ValidationError,
        message: String,
    },

    /// The Conversion Service failed; inputs are kept for a retry.
    #[error("{message}")]
    Conversion { message: String },

    /// The artifact could not be retrieved.
    #[error("{message}")]
    Download { message: String },

    // ── Guard rejections ──────────────────────────────────────────────────
    /// The completion belonged to a file or cycle that has since been
    /// replaced or reset; its result was discarded.
    #[error("operation superseded by a newer selection or reset")]
    Superseded,

    /// The same step is already in flight.
    #[error("{step} already in progress")]
    Busy { step: Step },

    /// A conversion result is pending; call `reset()` before starting over.
    #[error("a conversion result is pending; reset the workflow first")]
    ResultPending,

    /// The format code is not selectable for the current detected type.
    #[error("format '{code}' is not available: {reason}")]
    FormatRejected { code: String, reason: String },

    /// The download handle was already used for a download-then-cleanup cycle.
    #[error("download handle '{handle}' has already been released")]
    HandleSpent { handle: String },

    /// `download()` was called with no conversion result.
    #[error("there is no converted artifact to download")]
    NoResult,

    /// Downloaded bytes could not be written to disk.
    #[error("failed to save '{}': {reason}", .path.display())]
    SaveFailed { path: PathBuf, reason: String },
}

impl WorkflowError {
    /// The workflow step this error belongs to.
    pub fn step(&self) -> Option<Step> {
        match self {
            WorkflowError::Detection { .. } => Some(Step::Detection),
            WorkflowError::Validation { .. } | WorkflowError::Conversion { .. } => {
                Some(Step::Conversion)
            }
            WorkflowError::Download { .. }
            | WorkflowError::HandleSpent { .. }
            | WorkflowError::NoResult
            | WorkflowError::SaveFailed { .. } => Some(Step::Download),
            WorkflowError::FormatRejected { .. } => Some(Step::FormatSelection),
            WorkflowError::Busy { step } => Some(*step),
            WorkflowError::Superseded | WorkflowError::ResultPending => None,
        }
    }
}

/// The steps of the conversion workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Selection,
    Detection,
    FormatSelection,
    Conversion,
    Download,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::Selection => "file selection",
            Step::Detection => "type detection",
            Step::FormatSelection => "format selection",
            Step::Conversion => "conversion",
            Step::Download => "download",
        };
        f.write_str(name)
    }
}

/// Fatal errors: the client cannot be configured or its inputs cannot be read.
#[derive(Debug, Error)]
pub enum GeoConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("file not found: '{}'\nCheck the path exists and is readable.", .path.display())]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{}'\nTry: chmod +r {path:?}", .path.display())]
    PermissionDenied { path: PathBuf },

    /// The file exists but reading it failed.
    #[error("failed to read '{}': {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// The persisted preferences file is unreadable or unwritable.
    #[error("preferences file '{}': {reason}", .path.display())]
    Preferences { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display_with_detail() {
        let e = ServiceError::Rejected {
            status: 400,
            detail: Some("Cannot determine file type.".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("400"), "got: {msg}");
        assert!(msg.contains("Cannot determine"), "got: {msg}");
        assert_eq!(e.detail(), Some("Cannot determine file type."));
    }

    #[test]
    fn rejected_display_without_detail() {
        let e = ServiceError::Rejected {
            status: 500,
            detail: None,
        };
        assert_eq!(e.to_string(), "server returned HTTP 500");
        assert_eq!(e.detail(), None);
        assert_eq!(e.status(), Some(500));
    }

    #[test]
    fn transport_has_no_detail() {
        let e = ServiceError::Transport("connection refused".into());
        assert!(e.detail().is_none());
        assert!(e.status().is_none());
    }

    #[test]
    fn workflow_error_shows_user_message() {
        let e = WorkflowError::Conversion {
            message: "An error occurred during conversion".into(),
        };
        assert_eq!(e.to_string(), "An error occurred during conversion");
        assert_eq!(e.step(), Some(Step::Conversion));
    }

    #[test]
    fn busy_names_the_step() {
        let e = WorkflowError::Busy {
            step: Step::Conversion,
        };
        assert_eq!(e.to_string(), "conversion already in progress");
    }

    #[test]
    fn superseded_has_no_step() {
        assert_eq!(WorkflowError::Superseded.step(), None);
    }
}
