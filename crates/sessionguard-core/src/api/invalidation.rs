//! Classifying failures as "the server dropped our session".
//!
//! The check is a deliberately broad substring match: any message mentioning
//! "session" counts, so an unrelated error that happens to use the word will
//! also log the user out. Catching the many ways servers phrase an expired
//! login matters more here than precision.

use std::borrow::Cow;

use serde::Serialize;
use serde_json::Value;

use super::ApiError;

/// Phrases that mark a message as a session invalidation (matched lower-cased)
const INVALIDATION_PHRASES: &[&str] = &[
    "session",
    "token expired",
    "invalid token",
    "session expired",
    "session has been invalidated",
    "session not found",
];

/// Anything that can carry a status code and a message.
pub trait InvalidationSignal {
    fn status_code(&self) -> Option<u16>;
    fn message(&self) -> Option<Cow<'_, str>>;
}

/// Best-effort view of a JSON error body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: Option<String>,
    pub status: Option<u16>,
    pub status_code: Option<u16>,
}

impl ErrorPayload {
    /// Pull the known fields out of any JSON value. Fields of the wrong type
    /// are ignored rather than rejected.
    pub fn from_value(value: &Value) -> Self {
        let status = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|n| u16::try_from(n).ok())
        };
        Self {
            message: value.get("message").and_then(Value::as_str).map(str::to_string),
            status: status("status"),
            status_code: status("statusCode"),
        }
    }
}

impl InvalidationSignal for ErrorPayload {
    fn status_code(&self) -> Option<u16> {
        match (self.status, self.status_code) {
            (Some(401), _) | (_, Some(401)) => Some(401),
            (status, code) => status.or(code),
        }
    }

    fn message(&self) -> Option<Cow<'_, str>> {
        self.message.as_deref().map(Cow::Borrowed)
    }
}

impl InvalidationSignal for ApiError {
    fn status_code(&self) -> Option<u16> {
        self.status().map(|s| s.as_u16())
    }

    fn message(&self) -> Option<Cow<'_, str>> {
        match self {
            ApiError::Http { message, .. } => Some(Cow::Borrowed(message)),
            ApiError::InvalidResponse(message) => Some(Cow::Borrowed(message)),
            ApiError::SessionInvalidated => Some(Cow::Owned(self.to_string())),
            // Transport and local failures carry no server message; their
            // text includes URLs that would trip the heuristic
            ApiError::Network(_) | ApiError::InvalidHeader(_) | ApiError::Store(_) => None,
        }
    }
}

/// True when the status is exactly 401 or the message contains one of the
/// invalidation phrases, case-insensitively.
///
/// The status is not otherwise consulted: a 200 whose body carries a matching
/// message still counts as invalidation.
pub fn is_session_invalidation_error<S: InvalidationSignal + ?Sized>(signal: &S) -> bool {
    if signal.status_code() == Some(401) {
        return true;
    }

    let Some(message) = signal.message() else {
        return false;
    };
    let message = message.to_lowercase();
    INVALIDATION_PHRASES.iter().any(|phrase| message.contains(phrase))
}
