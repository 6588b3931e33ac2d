/// Errors that can occur within the notification subsystem.
///
/// # Examples
///
/// ```rust
/// use certpulse_notify::error::NotifyError;
///
/// let err = NotifyError::Timeout { channel: "webhook".to_string(), after_ms: 2000 };
/// assert!(err.to_string().contains("2000"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// A recipient or sender address could not be parsed.
    #[error("Notify: invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// An HTTP request to an external notification endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// SMTP transport error when sending email.
    #[error("Notify: SMTP error: {0}")]
    SmtpError(String),

    /// The external API returned a non-success response.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },

    /// The channel did not finish within the dispatcher's deadline.
    #[error("Notify: {channel} channel timed out after {after_ms}ms")]
    Timeout { channel: String, after_ms: u64 },

    /// Generic notification error for cases not covered by other variants.
    #[error("Notify: {0}")]
    Other(String),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
