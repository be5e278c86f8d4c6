use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::routing::Router;

use super::credentials::{CredentialKind, CredentialStore, StoreError};

/// Tracks whether the user is logged in.
///
/// The signal is derived from the presence of the user credential and never
/// persisted. Once attached to a router it is re-derived after every completed
/// navigation, so credentials cleared elsewhere (e.g. by the API client on a
/// 401) are picked up on the next route change.
pub struct SessionTracker {
    store: Arc<dyn CredentialStore>,
    logged_in: watch::Sender<bool>,
}

impl SessionTracker {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (logged_in, _) = watch::channel(false);
        Self { store, logged_in }
    }

    /// Current value of the signal
    pub fn is_logged_in(&self) -> bool {
        *self.logged_in.borrow()
    }

    /// Receiver that observes every change of the signal
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.logged_in.subscribe()
    }

    /// Recompute the signal from local storage. No network call is made.
    pub fn check_auth_state(&self) -> Result<bool, StoreError> {
        let logged_in = self.store.has(CredentialKind::User)?;
        self.publish(logged_in);
        Ok(logged_in)
    }

    /// Store the token and flip the signal on. The token is not checked
    /// against the server.
    pub fn login(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(CredentialKind::User, token)?;
        self.publish(true);
        info!("User logged in");
        Ok(())
    }

    pub fn logout(&self) -> Result<(), StoreError> {
        self.store.clear(CredentialKind::User)?;
        self.publish(false);
        info!("User logged out");
        Ok(())
    }

    /// Run the initial check and re-check after every navigation the router
    /// completes.
    pub fn attach(self: &Arc<Self>, router: &Router) -> Result<(), StoreError> {
        self.check_auth_state()?;
        let tracker = Arc::clone(self);
        router.after_each(move |to, _from| {
            let logged_in = tracker.check_auth_state()?;
            debug!(path = %to.path, logged_in, "Auth state re-checked after navigation");
            Ok(())
        });
        Ok(())
    }

    fn publish(&self, logged_in: bool) {
        self.logged_in.send_if_modified(|current| {
            let changed = *current != logged_in;
            *current = logged_in;
            changed
        });
    }
}
