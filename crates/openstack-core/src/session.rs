//! Authenticated session state.

use crate::auth::AuthOutcome;
use crate::catalog::EndpointCatalog;
use crate::types::ServiceEndpoint;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

/// Token and endpoint of a connection.
///
/// The token and endpoint are only ever set together from an [`AuthOutcome`],
/// so a session is authenticated exactly when it has an endpoint.
#[derive(Debug, Default)]
pub struct SessionState {
    token: Option<SecretString>,
    endpoint: Option<ServiceEndpoint>,
    catalog: EndpointCatalog,
    token_expires: Option<DateTime<Utc>>,
    generation: u64,
}

impl SessionState {
    /// Create an unauthenticated session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the session with the result of an authentication.
    pub fn apply(&mut self, outcome: AuthOutcome) {
        self.token = Some(outcome.token);
        self.endpoint = Some(outcome.endpoint);
        self.catalog = outcome.catalog;
        self.token_expires = outcome.token_expires;
        self.generation += 1;
    }

    /// Whether an authentication has succeeded.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Current token.
    #[must_use]
    pub const fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    /// Selected service endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> Option<&ServiceEndpoint> {
        self.endpoint.as_ref()
    }

    /// Regions and services advertised at the last authentication.
    #[must_use]
    pub const fn catalog(&self) -> &EndpointCatalog {
        &self.catalog
    }

    /// Expiry of the current token.
    #[must_use]
    pub const fn token_expires(&self) -> Option<DateTime<Utc>> {
        self.token_expires
    }

    /// Number of successful authentications so far.
    ///
    /// Callers compare it before and after waiting on a re-authentication to
    /// tell whether someone else already refreshed the token.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}
