//! Error taxonomy shared by sources, stores and the sync protocol.
//!
//! Only `Config` is fatal. Every other kind is absorbed by the step that
//! produced it: sources degrade to "no result", the sync protocol degrades to
//! `SyncOutcome::Failed`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LyricsError {
    /// No candidate / no record. Expected, not worth an error log.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Malformed response body or unexpected response shape.
    #[error("malformed response: {0}")]
    Parse(String),

    /// Record already exists (or is already in the expected state).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("persist failure: {0}")]
    PersistFailure(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LyricsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LyricsError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LyricsError::Conflict(_))
    }
}

impl From<serde_json::Error> for LyricsError {
    fn from(e: serde_json::Error) -> Self {
        LyricsError::Parse(e.to_string())
    }
}

impl From<rusqlite::Error> for LyricsError {
    fn from(e: rusqlite::Error) -> Self {
        LyricsError::PersistFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LyricsError>;
