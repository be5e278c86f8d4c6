use reqwest::StatusCode;
use thiserror::Error;

use crate::auth::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The server no longer accepts our credential. The credential has been
    /// cleared and a redirect to the login page issued.
    #[error("Session invalidated. Please log in again.")]
    SessionInvalidated,

    #[error("{message}")]
    Http { status: StatusCode, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Build the generic failure for a non-success response whose body
    /// could not be parsed
    pub(crate) fn from_status(status: StatusCode) -> Self {
        let message = match status.canonical_reason() {
            Some(reason) => format!("HTTP Error: {} {}", status.as_u16(), reason),
            None => format!("HTTP Error: {}", status.as_u16()),
        };
        ApiError::Http { status, message }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_session_invalidated(&self) -> bool {
        matches!(self, ApiError::SessionInvalidated)
    }
}
