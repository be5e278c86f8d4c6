//! Authentication module for credentials and session state.
//!
//! This module provides:
//! - `CredentialStore`: persistent user/admin token storage, with in-memory,
//!   JSON file, and OS keychain backends
//! - `SessionTracker`: the derived "is logged in" signal
//!
//! Presence of a token is the only thing that counts; tokens are never
//! decoded or verified locally.

pub mod credentials;
pub mod session;

pub use credentials::{
    CredentialKind, CredentialStore, FileStore, KeyringStore, MemoryStore, StoreError,
    StoredCredential,
};
pub use session::SessionTracker;
