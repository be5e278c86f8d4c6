//! Credential-aware HTTP client.
//!
//! Every request goes out with `Content-Type: application/json` and, when a
//! token is stored, `Authorization: Bearer <token>`. Responses that signal a
//! dropped session (401, or an error message that mentions the session or an
//! expired/invalid token) clear the credential and hard-redirect to the login
//! page.

pub mod client;
pub mod error;
pub mod invalidation;

pub use client::{ApiClient, ClientSettings, RequestOptions};
pub use error::ApiError;
pub use invalidation::{is_session_invalidation_error, ErrorPayload, InvalidationSignal};
pub use reqwest::Method;
