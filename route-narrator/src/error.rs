use std::fmt;

use thiserror::Error;

use crate::resolver::ResolveError;
use crate::session::SessionError;
use crate::store::StoreError;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Capability {
    Speech,
    Geolocation,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Capability::Speech => write!(f, "speech synthesis"),
            Capability::Geolocation => write!(f, "geolocation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum NavError {
    #[error("too many actions in a short period, ignoring")]
    RateLimited,
    #[error("couldn't resolve route: {0}")]
    ResolutionFailed(#[from] ResolveError),
    #[error("{0}")]
    ValidationFailed(String),
    #[error("{0} isn't supported on this host")]
    UnsupportedCapability(Capability),
    #[error(transparent)]
    InvalidTransition(#[from] SessionError),
    #[error("route storage failed: {0}")]
    Storage(#[from] StoreError),
}
