//! Error types for budget persistence

use std::path::PathBuf;

pub type BudgetResult<T> = Result<T, BudgetError>;

#[derive(Debug, thiserror::Error)]
pub enum BudgetError {
    /// Reading or writing the state file failed
    #[error("budget state I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state could not be encoded
    #[error("budget state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store-specific failure
    #[error("budget store error: {0}")]
    Backend(String),
}
