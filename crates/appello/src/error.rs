use thiserror::Error;

/// Errors raised by an [`AttendanceStore`](crate::store::AttendanceStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required field is missing or malformed
    #[error("{0}")]
    Validation(String),

    /// A unique key (Tr. No. or ITS No.) is already taken
    #[error("{0}")]
    Duplicate(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt stored data: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for errors caused by the caller's input rather than the backend
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            StoreError::Validation(_) | StoreError::Duplicate(_) | StoreError::NotFound { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_is_verbatim() {
        let err = StoreError::Duplicate("Tr. No. already exists".to_string());
        assert_eq!(err.to_string(), "Tr. No. already exists");
        assert!(err.is_user_error());
    }

    #[test]
    fn test_not_found_message() {
        let err = StoreError::not_found("class", "c9");
        assert_eq!(err.to_string(), "class not found: c9");
    }

    #[test]
    fn test_backend_errors_are_not_user_errors() {
        let err = StoreError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(!err.is_user_error());
    }
}
