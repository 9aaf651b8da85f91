//! Error types for the reconciliation engine.

use std::path::PathBuf;

use oxide_score::error::ScoreBuildError;
use oxide_score::version::VersionOrdering;

use crate::catalog::GrainState;

/// Errors that can occur while updating a database.
#[derive(Debug, thiserror::Error)]
pub enum DbSyncError {
    /// The declared grain version cannot replace the persisted one.
    #[error(
        "Grain '{grain}' version '{declared}' compares as {ordering} against database version '{persisted}'. Upgrade is not possible."
    )]
    VersionConflict {
        /// Grain name.
        grain: String,
        /// Version declared in the score.
        declared: String,
        /// Version recorded in the database.
        persisted: String,
        /// Result of comparing declared against persisted.
        ordering: VersionOrdering,
    },

    /// User tables exist but the system catalog does not.
    #[error(
        "Cannot initialize a non-empty database without system tables. Use force_init to proceed anyway."
    )]
    NonEmptyDatabase,

    /// A grain was left in a state that needs manual attention.
    #[error(
        "Cannot proceed with database upgrade: grain '{grain}' is in '{state}' state, expected 'ready', 'recover' or 'lock'"
    )]
    InvalidGrainState {
        /// Grain name.
        grain: String,
        /// Persisted state.
        state: GrainState,
    },

    /// A persisted grain record could not be interpreted.
    #[error("Corrupted catalog record for grain '{grain}': {message}")]
    CorruptedRecord {
        /// Grain name.
        grain: String,
        /// What is wrong with the record.
        message: String,
    },

    /// One or more grains ended in the error state.
    #[error("Not all grains were updated successfully, see celesta_grains for details: {}", .0.join(", "))]
    NotAllGrainsUpdated(Vec<String>),

    /// The live database holds a structure the adaptor cannot interpret.
    #[error("Unsupported database structure: {0}")]
    Unsupported(String),

    /// The score failed validation.
    #[error(transparent)]
    Score(#[from] ScoreBuildError),

    /// Database error during reconciliation.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading grain files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a grain file.
    #[error("Failed to parse grain file '{path}': {message}")]
    ParseError {
        /// Path to the grain file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// No score directory found.
    #[error("Score directory not found: {0}")]
    ScoreDirNotFound(PathBuf),
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, DbSyncError>;
