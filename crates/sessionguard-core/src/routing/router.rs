use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::navigator::Navigator;

use super::{
    BeforeEach, NavigationDecision, NavigationError, ResolvedRoute, RouteTable, RouteTarget,
};

/// Redirect chains longer than this are treated as a loop
const MAX_REDIRECTS: usize = 10;

type AfterEachHook = Arc<
    dyn Fn(&ResolvedRoute, Option<&ResolvedRoute>) -> Result<(), NavigationError> + Send + Sync,
>;

/// A committed navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub route: ResolvedRoute,
    /// Path originally requested when a guard sent us elsewhere
    pub redirected_from: Option<String>,
}

impl Navigation {
    pub fn was_redirected(&self) -> bool {
        self.redirected_from.is_some()
    }
}

/// Resolves paths against a route table, runs before-each guards, commits the
/// transition and notifies after-each hooks.
pub struct Router {
    table: RouteTable,
    guards: Mutex<Vec<Arc<dyn BeforeEach>>>,
    after_hooks: Mutex<Vec<AfterEachHook>>,
    current: Mutex<Option<ResolvedRoute>>,
    reloads: AtomicUsize,
}

impl Router {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table,
            guards: Mutex::new(Vec::new()),
            after_hooks: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Register a guard. Guards run in registration order.
    pub fn before_each(&self, guard: Arc<dyn BeforeEach>) {
        self.guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(guard);
    }

    /// Subscribe to completed navigations. Hooks run in registration order
    /// after the route is committed; a failing hook does not stop the rest.
    pub fn after_each<F>(&self, hook: F)
    where
        F: Fn(&ResolvedRoute, Option<&ResolvedRoute>) -> Result<(), NavigationError>
            + Send
            + Sync
            + 'static,
    {
        self.after_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    pub fn current(&self) -> Option<ResolvedRoute> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of hard redirects performed so far
    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Navigate to a path or named route.
    ///
    /// A guard redirect abandons the requested route and starts a fresh
    /// navigation to the redirect target, which is guarded in turn.
    ///
    /// Errors from guards or route resolution leave the current route alone.
    /// An after-each hook error is returned only once the navigation has been
    /// committed: `current()` already reports the new route and every other
    /// hook has run.
    pub fn push(&self, target: impl Into<RouteTarget>) -> Result<Navigation, NavigationError> {
        let target = target.into();
        let requested = self.resolve(&target)?;
        let from = self.current();

        let mut to = requested.clone();
        let mut redirects = 0;
        while let NavigationDecision::Redirect(next) = self.run_guards(&to, from.as_ref())? {
            redirects += 1;
            if redirects > MAX_REDIRECTS {
                return Err(NavigationError::RedirectLoop(requested.path));
            }
            debug!(from = %to.path, to = %next, "Navigation redirected");
            to = self.resolve(&next)?;
        }

        let redirected_from = (redirects > 0).then(|| requested.path.clone());
        self.commit(to.clone(), from)?;
        Ok(Navigation {
            route: to,
            redirected_from,
        })
    }

    fn resolve(&self, target: &RouteTarget) -> Result<ResolvedRoute, NavigationError> {
        self.table.resolve(target).cloned().ok_or_else(|| match target {
            RouteTarget::Path(path) => NavigationError::NotFound(path.clone()),
            RouteTarget::Name(name) => NavigationError::UnknownRouteName(name.clone()),
        })
    }

    fn run_guards(
        &self,
        to: &ResolvedRoute,
        from: Option<&ResolvedRoute>,
    ) -> Result<NavigationDecision, NavigationError> {
        let guards = self
            .guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for guard in guards {
            if let redirect @ NavigationDecision::Redirect(_) = guard.before_each(to, from)? {
                return Ok(redirect);
            }
        }
        Ok(NavigationDecision::Proceed)
    }

    fn commit(
        &self,
        to: ResolvedRoute,
        from: Option<ResolvedRoute>,
    ) -> Result<(), NavigationError> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(to.clone());

        let hooks = self
            .after_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut first_error = None;
        for hook in hooks {
            if let Err(e) = hook(&to, from.as_ref()) {
                warn!(path = %to.path, error = %e, "After-each hook failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Navigator for Router {
    fn hard_redirect(&self, location: &str) {
        info!(location, "Hard redirect, discarding router state");
        self.reloads.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;

        if let Err(e) = self.push(location) {
            warn!(location, error = %e, "Hard redirect navigation failed");
        }
    }
}
