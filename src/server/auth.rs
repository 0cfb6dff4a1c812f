//! Authenticator gate module
//!
//! Authorization policy is external configuration: the server is constructed
//! with a pure predicate and never learns what a credential means. The
//! credential value is checked and discarded, never logged or stored.

use std::fmt;
use std::sync::Arc;

use crate::protocol::FileRequest;

/// Predicate deciding whether a credential may fetch a request
type AuthPredicate = dyn Fn(&str, &FileRequest) -> bool + Send + Sync;

/// Authorization gate consulted once per connection
#[derive(Clone)]
pub struct Authenticator {
    predicate: Arc<AuthPredicate>,
}

impl Authenticator {
    /// Create an authenticator from a predicate
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&str, &FileRequest) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Authenticator that rejects every request. The default.
    pub fn deny_all() -> Self {
        Self::new(|_, _| false)
    }

    /// Authenticator that accepts every request carrying any credential
    pub fn allow_all() -> Self {
        Self::new(|_, _| true)
    }

    /// Authenticator comparing the credential to a fixed secret
    pub fn equals(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        Self::new(move |credential, _| credential == secret)
    }

    /// Decide whether this request may proceed.
    ///
    /// A missing credential is denied without consulting the predicate.
    pub fn authorize(&self, credential: Option<&str>, request: &FileRequest) -> bool {
        match credential {
            Some(credential) => (self.predicate)(credential, request),
            None => false,
        }
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::deny_all()
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}
