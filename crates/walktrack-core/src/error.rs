use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Coarse failure category exposed to the calling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    DataIntegrity,
    Unavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::DataIntegrity => write!(f, "data_integrity"),
            ErrorKind::Unavailable => write!(f, "unavailable"),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Store unavailable: {0}")]
    Unavailable(#[source] StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => EngineError::Conflict(format!("duplicate {}", what)),
            other => EngineError::Unavailable(other),
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::DataIntegrity(_) => ErrorKind::DataIntegrity,
            EngineError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// Static message suitable for showing to a walker or checkpoint operator.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NotFound => "Record not found, please check the code and scan again",
            ErrorKind::Conflict => "This action is not allowed in the current state",
            ErrorKind::DataIntegrity => "Team information is inconsistent, please contact staff",
            ErrorKind::Unavailable => "Service is busy, please try again later",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_store_error_maps_to_conflict() {
        let err: EngineError = StoreError::Duplicate("person p1".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_backend_store_error_maps_to_unavailable() {
        let err: EngineError = StoreError::Backend("connection reset".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_every_kind_has_a_message() {
        let errors = [
            EngineError::NotFound("p".to_string()),
            EngineError::Conflict("c".to_string()),
            EngineError::DataIntegrity("d".to_string()),
            EngineError::Unavailable(StoreError::Backend("b".to_string())),
        ];
        for err in errors {
            assert!(!err.user_message().is_empty());
        }
    }
}
