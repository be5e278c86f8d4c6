//! Route-level access control.
//!
//! This module provides:
//! - `RouteTable`: static routes with `requiresAuth` / `requiresAdmin` meta
//! - `NavigationGuard`: the before-each check that sends unauthenticated
//!   visitors of protected routes to the login pages
//! - `Router`: runs guards before each transition and notifies after-each
//!   subscribers once a transition completes

pub mod error;
pub mod guard;
pub mod route;
pub mod router;

pub use error::NavigationError;
pub use guard::{BeforeEach, NavigationDecision, NavigationGuard, ADMIN_LOGIN_ROUTE, LOGIN_ROUTE};
pub use route::{ResolvedRoute, RouteDef, RouteMeta, RouteTable, RouteTarget};
pub use router::{Navigation, Router};
