/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use certpulse_storage::error::StorageError;
///
/// let err = StorageError::InvalidValue {
///     field: "notify_upfront",
///     reason: "must be greater than zero".to_string(),
/// };
/// assert!(err.to_string().contains("notify_upfront"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (ext_key_usages column).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error while preparing the data directory.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored status string is not one of the known statuses.
    #[error("Storage: unknown status '{0}'")]
    InvalidStatus(String),

    /// A value handed to the store violates a data-model invariant.
    #[error("Storage: invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// The owner does not track the domain.
    #[error("Storage: {user_id} does not track {domain}")]
    TrackingNotFound { user_id: String, domain: String },
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
