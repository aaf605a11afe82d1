//! AI collaborator error types.

use thiserror::Error;

/// Errors that can occur when interacting with the content generation API.
/// All of them are recoverable: the caller surfaces them as a typed
/// failure, never a crash.
#[derive(Debug, Error)]
pub enum AiError {
    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The model replied, but the content was not the expected JSON.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}
