//! Full-page redirect seam used when a session has to be torn down.

/// Performs a hard redirect: a full navigation to `location` that discards
/// in-memory application state and starts over.
///
/// There is no failure path and no cancellation; whatever else was in flight
/// is simply abandoned.
pub trait Navigator: Send + Sync {
    fn hard_redirect(&self, location: &str);
}
