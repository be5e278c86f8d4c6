//! Client-side session guard.
//!
//! Decides on every navigation and every API call whether the caller is
//! authenticated:
//!
//! - `auth`: the shared credential store and the derived login signal
//! - `routing`: route table, before-each navigation guard, and router
//! - `api`: HTTP client that injects credentials and reacts to invalidation
//! - `config`: on-disk configuration
//!
//! All components take the credential store as an explicit
//! `Arc<dyn CredentialStore>`; none of them owns it exclusively and any of
//! them may clear a credential.

pub mod api;
pub mod auth;
pub mod config;
pub mod navigator;
pub mod routing;

pub use api::{ApiClient, ApiError, ClientSettings, RequestOptions};
pub use auth::{CredentialKind, CredentialStore, SessionTracker, StoreError};
pub use config::Config;
pub use navigator::Navigator;
pub use routing::{NavigationGuard, Router};
