use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Row not found for update: {0}")]
    MissingRow(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Transaction commit failed: {0}")]
    CommitFailed(String),
}

impl StoreError {
    /// Whether the failure is a uniqueness violation rather than I/O.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}
