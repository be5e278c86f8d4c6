use thiserror::Error;

use crate::auth::StoreError;

#[derive(Error, Debug)]
pub enum NavigationError {
    #[error("No route matches path: {0}")]
    NotFound(String),

    #[error("No route named: {0}")]
    UnknownRouteName(String),

    #[error("Too many redirects while navigating to {0}")]
    RedirectLoop(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
