//! Credential provider
//!
//! The core never stores or validates credentials. It asks the provider for
//! the current bearer token right before each request and attaches it only
//! when one is present.

use std::fmt;

/// An opaque bearer token
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the `Authorization` header
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Supplies the credential for the current session
pub trait CredentialProvider: Send + Sync {
    /// The current credential, or `None` when the session is anonymous
    fn credential(&self) -> Option<Credential>;
}

/// A fixed credential (or none), typically read from config
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<Credential>);

impl StaticCredential {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.is_empty()).map(Credential::new))
    }

    /// No credential at all
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<Credential> {
        self.0.clone()
    }
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Option<Credential> + Send + Sync,
{
    fn credential(&self) -> Option<Credential> {
        self()
    }
}
