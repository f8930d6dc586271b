//! Error types for clausecut library.

use std::io;
use thiserror::Error;

/// Result type alias for clausecut operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for clausecut library.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while loading rule tables or schemas.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The classifier could not be reached or refused the request.
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    /// The clause-merge reply did not have the list-of-groups shape.
    #[error("Malformed clause merge reply: {reason}")]
    MalformedMergeReply { reason: String },

    /// Two merge groups claimed the same clause id.
    #[error("Clause {id} appears in more than one merge group")]
    ConflictingMergeGroups { id: u32 },

    /// A boundary rule pattern failed to compile.
    #[error("Invalid boundary pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// An audit schema failed to compile.
    #[error("Schema error: {0}")]
    Schema(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by a [`Classifier`](crate::classifier::Classifier).
///
/// Only transport-level problems are represented here. A reply that arrives
/// but cannot be validated is handled by the retry/fallback logic of the
/// caller and never becomes a `ClassifierError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    /// The request failed in transit (HTTP error, connection reset, ...).
    #[error("Classifier transport error: {0}")]
    Transport(String),

    /// The service answered without any content.
    #[error("Classifier returned an empty reply")]
    EmptyReply,
}

/// Message fragments that mark a transport error as worth retrying.
const TRANSIENT_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "too many requests",
    "timeout",
    "timed out",
    "temporarily",
    "unavailable",
    "503",
];

impl ClassifierError {
    /// Creates a transport error from any displayable cause.
    pub fn transport(cause: impl std::fmt::Display) -> Self {
        ClassifierError::Transport(cause.to_string())
    }

    /// Returns true for rate limiting, timeouts, and temporary unavailability.
    ///
    /// Recognition is by message inspection, since backing services report
    /// these conditions in free text.
    pub fn is_transient(&self) -> bool {
        match self {
            ClassifierError::Transport(message) => {
                let message = message.to_lowercase();
                TRANSIENT_MARKERS
                    .iter()
                    .any(|marker| message.contains(marker))
            }
            ClassifierError::EmptyReply => false,
        }
    }
}
