//! Error types for key-value index operations.

/// Result type for key-value index operations.
pub type KvIndexResult<T> = std::result::Result<T, KvIndexError>;

/// Errors that can occur while locating records or applying a commit.
#[derive(Debug, thiserror::Error)]
pub enum KvIndexError {
    /// A call to the key-value store failed.
    #[error("store {operation} failed: {message}")]
    StoreOperation {
        /// Which store call failed (`multi_get`, `multi_put`, ...).
        operation: String,
        /// The underlying error message.
        message: String,
        /// Whether re-issuing the same call may succeed.
        retryable: bool,
    },

    /// A raw store value could not be decoded.
    #[error("entry decode error for key '{key}': {message}")]
    EntryDecode { key: String, message: String },

    /// Configuration rejected at validation time.
    #[error("invalid index configuration: {message}")]
    InvalidConfig { message: String },

    /// Commit-apply was invoked for an instant that is not completed.
    #[error("commit {instant_time} is {state}, refusing to update index")]
    CommitNotCompleted { instant_time: String, state: String },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A spawned partition task panicked or was cancelled.
    #[error("index task failed: {message}")]
    TaskFailed { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl KvIndexError {
    /// Create a store operation error.
    pub fn store_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        KvIndexError::StoreOperation {
            operation: operation.into(),
            message: message.into(),
            retryable,
        }
    }

    /// Create a transient (retryable) store error.
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::store_operation(operation, message, true)
    }

    pub fn entry_decode(key: impl Into<String>, message: impl Into<String>) -> Self {
        KvIndexError::EntryDecode {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        KvIndexError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        KvIndexError::Internal {
            message: message.into(),
        }
    }

    /// Whether the caller's retry policy may re-issue the failed invocation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KvIndexError::StoreOperation {
                retryable: true,
                ..
            }
        )
    }
}

impl From<tokio::task::JoinError> for KvIndexError {
    fn from(e: tokio::task::JoinError) -> Self {
        KvIndexError::TaskFailed {
            message: e.to_string(),
        }
    }
}
