use std::sync::Arc;

use tracing::debug;

use crate::auth::{CredentialKind, CredentialStore, StoreError};

use super::{NavigationError, ResolvedRoute, RouteTarget};

/// Route name of the standard login page
pub const LOGIN_ROUTE: &str = "login";

/// Route name of the admin login page
pub const ADMIN_LOGIN_ROUTE: &str = "admin-login";

/// Outcome of a before-each hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Let the transition complete unmodified
    Proceed,
    /// Abandon the transition and go here instead
    Redirect(RouteTarget),
}

/// Hook run by the router before every transition is committed.
pub trait BeforeEach: Send + Sync {
    fn before_each(
        &self,
        to: &ResolvedRoute,
        from: Option<&ResolvedRoute>,
    ) -> Result<NavigationDecision, NavigationError>;
}

/// Blocks protected routes when the matching credential is missing.
///
/// Rules are checked in order and the first match wins:
/// 1. admin route without an admin token: redirect to `admin-login`
/// 2. auth route without a user token: redirect to `login`
/// 3. otherwise proceed
///
/// Each call is independent. A blocked navigation is dropped, not replayed
/// after login.
pub struct NavigationGuard {
    store: Arc<dyn CredentialStore>,
}

impl NavigationGuard {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub fn check(&self, to: &ResolvedRoute) -> Result<NavigationDecision, StoreError> {
        if to.meta.requires_admin && !self.store.has(CredentialKind::Admin)? {
            debug!(path = %to.path, "Admin credential missing, redirecting to admin login");
            return Ok(NavigationDecision::Redirect(RouteTarget::name(ADMIN_LOGIN_ROUTE)));
        }

        if to.meta.requires_auth && !self.store.has(CredentialKind::User)? {
            debug!(path = %to.path, "User credential missing, redirecting to login");
            return Ok(NavigationDecision::Redirect(RouteTarget::name(LOGIN_ROUTE)));
        }

        Ok(NavigationDecision::Proceed)
    }
}

impl BeforeEach for NavigationGuard {
    fn before_each(
        &self,
        to: &ResolvedRoute,
        _from: Option<&ResolvedRoute>,
    ) -> Result<NavigationDecision, NavigationError> {
        Ok(self.check(to)?)
    }
}
