//! Error types and Result aliases for sourcewatch.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sourcewatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// File watching or traversal error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Language registration or chunk extraction error.
    #[error("extract error: {0}")]
    Extract(#[from] ExtractError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// Directory traversal failed.
    #[error("failed to walk '{path}': {reason}")]
    Walk { path: String, reason: String },
}

/// Language spec and extraction errors.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// A declarative query failed to compile against its grammar.
    #[error("invalid {kind} query for '{language}/{node_type}': {reason}")]
    Query {
        language: String,
        node_type: String,
        kind: &'static str,
        reason: String,
    },

    /// A file role pattern is not a valid glob.
    #[error("invalid role pattern '{pattern}' for '{language}': {reason}")]
    Glob {
        language: String,
        pattern: String,
        reason: String,
    },

    /// The grammar could not be loaded or produced no tree.
    #[error("failed to parse with '{language}': {reason}")]
    Parse { language: String, reason: String },

    /// A language with this name is already registered.
    #[error("language '{0}' is already registered")]
    DuplicateLanguage(String),

    /// No registered language matches.
    #[error("no language registered for '{0}'")]
    UnknownLanguage(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl WatcherError {
    /// Create a watch registration error.
    pub fn watch_failed(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::WatchFailed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
