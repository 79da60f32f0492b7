//! Error taxonomy for dispatch, extraction and apply.
//!
//! * [`UnsupportedType`]: terminal: the filename's extension maps to no adapter.
//! * [`ExtractionFailure`]: an adapter's parse failed. Adapters never return
//!   this; they hand back an `Error` record instead, and [`crate::session`]
//!   lifts that record into this type for callers that want a `Result`.
//! * [`ApplyError`]: a write or post-write verification failed. The input and
//!   any session state are left as they were.
//! * [`ChangeSetError`]: a field name outside the format's editable set.

use thiserror::Error;

use crate::format::Format;

/// The filename's extension is not one of the supported formats.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported file type: '{filename}'")]
pub struct UnsupportedType {
    pub filename: String,
}

/// The underlying library could not parse the file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExtractionFailure {
    pub message: String,
}

/// A failed `apply`.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The format has no write path (video).
    #[error("Editing {0} metadata is not supported")]
    EditNotSupported(Format),

    /// A change set built for one format was handed to another format's adapter.
    #[error("Change set is for {found} files but the adapter handles {expected}")]
    FormatMismatch { expected: Format, found: Format },

    /// `apply` was called on a session that has no extracted metadata yet.
    #[error("No metadata loaded; extract before applying changes")]
    NotLoaded,

    /// A written value did not read back as requested.
    #[error("Metadata update verification failed for '{field}': expected {expected:?}, found {found:?}")]
    VerificationMismatch {
        field: String,
        expected: String,
        found: Option<String>,
    },

    /// The library failed while loading, modifying or saving the file.
    #[error("Failed to update {format} metadata: {source:#}")]
    Write {
        format: Format,
        #[source]
        source: anyhow::Error,
    },
}

impl ApplyError {
    pub(crate) fn write(format: Format, source: anyhow::Error) -> Self {
        ApplyError::Write { format, source }
    }

    /// Field name for a verification mismatch.
    pub fn mismatched_field(&self) -> Option<&str> {
        match self {
            ApplyError::VerificationMismatch { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// A change set entry was rejected at the interface boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChangeSetError {
    #[error("'{field}' is not an editable {format} field")]
    NotEditable { format: Format, field: String },
}

/// Failures surfaced by an [`EditSession`](crate::session::EditSession).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Extraction(#[from] ExtractionFailure),

    #[error(transparent)]
    Apply(#[from] ApplyError),
}
