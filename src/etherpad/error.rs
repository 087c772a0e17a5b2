//! Error type for Etherpad API operations.

/// Error returned by every Etherpad API call.
///
/// Transport failures and application-level failures are kept apart: the
/// Etherpad HTTP API answers most errors with `200 OK` and a non-zero `code`
/// in the JSON envelope, which surfaces here as [`EtherpadError::Api`].
#[derive(Debug, thiserror::Error)]
pub enum EtherpadError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Etherpad API error: {message} (code: {code})")]
    Api { code: i64, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Invalid Etherpad URL: {0}")]
    InvalidUrl(String),
}

/// Result type for Etherpad API operations.
pub type EtherpadResult<T> = Result<T, EtherpadError>;

impl EtherpadError {
    /// Whether the server answered with an application-level error.
    pub fn is_api_error(&self) -> bool {
        matches!(self, Self::Api { .. })
    }
}
