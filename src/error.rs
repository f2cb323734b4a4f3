//! Error types for the rex-report library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`StageError`] — **Non-fatal**: one pipeline stage produced no result
//!   (the upload is not a decodable image, the vision call failed, the
//!   generation call failed). The session stores it, shows it to the user
//!   and stays usable; the user retries by uploading again or pressing
//!   generate again.
//!
//! * [`RexError`] — **Fatal for the call that returned it**: bad input path,
//!   invalid configuration, an event fired in a state that does not accept
//!   it, or the download artifact could not be written. Session events
//!   return `RexError`; a stage failure arrives wrapped as
//!   [`RexError::Stage`] so callers can tell the two apart.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the rex-report library.
#[derive(Debug, Error)]
pub enum RexError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file extension is not one the upload control accepts.
    #[error("Unsupported file type '{path}': expected a .jpg, .jpeg or .png image")]
    UnsupportedFileType { path: PathBuf },

    // ── Session errors ────────────────────────────────────────────────────
    /// An event was fired in a state that does not accept it.
    #[error("Cannot {event} while the session is {phase}")]
    InvalidTransition {
        event: &'static str,
        phase: &'static str,
    },

    /// Download requested before any report was generated.
    #[error("No report has been generated yet")]
    NothingToDownload,

    /// A pipeline stage produced no result. The session keeps running.
    #[error(transparent)]
    Stage(#[from] StageError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the report file.
    #[error("Failed to write report file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The pipeline stage an error or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Encode,
    Extraction,
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Encode => "encode",
            Stage::Extraction => "extraction",
            Stage::Generation => "generation",
        };
        f.write_str(s)
    }
}

/// A non-fatal error for one pipeline stage.
///
/// Every variant means "no result was produced". The display text is meant
/// for the end user, so it names the step that failed in plain words.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StageError {
    /// The upload is not a decodable JPEG or PNG image.
    #[error("Error reading image: {detail}")]
    ImageDecode { detail: String },

    /// The vision model call failed (network, auth, quota, bad response).
    #[error("Error extracting text from image: {detail}")]
    Extraction { detail: String },

    /// The generation model call failed.
    #[error("Error generating report: {detail}")]
    Generation { detail: String },
}

impl StageError {
    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            StageError::ImageDecode { .. } => Stage::Encode,
            StageError::Extraction { .. } => Stage::Extraction,
            StageError::Generation { .. } => Stage::Generation,
        }
    }

    /// The underlying detail without the user-facing prefix.
    pub fn detail(&self) -> &str {
        match self {
            StageError::ImageDecode { detail }
            | StageError::Extraction { detail }
            | StageError::Generation { detail } => detail,
        }
    }
}
