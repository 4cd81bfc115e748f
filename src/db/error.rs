use thiserror::Error;

/// Errors that can occur during database operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// A precondition on an argument was violated at the call boundary
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Serialization failed: {0}")]
    Serialization(String),
    #[error("Operation failed: {0}")]
    Failed(String),
    /// Generic asynchronous failure whose meaningful cause sits one level down
    #[error("Operation completed exceptionally")]
    Completion(#[source] Option<Box<DatabaseError>>),
    #[error("Operation panicked: {0}")]
    Panicked(String),
    #[error("Executor is shut down")]
    Shutdown,
}

impl DatabaseError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        DatabaseError::InvalidArgument(message.into())
    }

    /// Wrap `cause` the way asynchronous drivers report failures.
    pub fn completion(cause: DatabaseError) -> Self {
        DatabaseError::Completion(Some(Box::new(cause)))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, DatabaseError::InvalidArgument(_))
    }

    /// Split off the direct cause of a completion wrapper.
    ///
    /// Returns `Ok(cause)` for `Completion(Some(cause))` and hands every
    /// other error back unchanged as `Err(self)`.
    pub fn take_completion_cause(self) -> std::result::Result<DatabaseError, DatabaseError> {
        match self {
            DatabaseError::Completion(Some(cause)) => Ok(*cause),
            other => Err(other),
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        DatabaseError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
