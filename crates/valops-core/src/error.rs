//! Error type shared by the daemon core.

use thiserror::Error;

/// Errors surfaced by a single tick of a periodic task.
///
/// Missing history and idle disks are not errors: they show up as absent
/// values in the derived statistics.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("validator core error: {0}")]
    Collaborator(String),
}

pub type Result<T> = std::result::Result<T, Error>;
