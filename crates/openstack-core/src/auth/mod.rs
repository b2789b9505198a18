//! Authentication strategies.
//!
//! The protocol is chosen once per connection from the auth URL: a path
//! ending in `v2.0` speaks the version 2 token API ([`V2Auth`]), anything else
//! the legacy header exchange ([`V1Auth`]).

mod v1;
mod v2;

pub use v1::V1Auth;
pub use v2::V2Auth;

use crate::catalog::EndpointCatalog;
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::transport::{Connector, Response, TransportRequest};
use crate::types::ServiceEndpoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Auth protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthVersion {
    /// Header-based exchange
    V1,
    /// JSON token API
    V2,
}

impl AuthVersion {
    /// Pick the protocol for an auth URL path.
    #[must_use]
    pub fn detect(auth_path: &str) -> Self {
        let path = auth_path.strip_suffix('/').unwrap_or(auth_path);
        if path.ends_with("v2.0") {
            Self::V2
        } else {
            Self::V1
        }
    }
}

impl fmt::Display for AuthVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => f.write_str("v1"),
            Self::V2 => f.write_str("v2.0"),
        }
    }
}

/// Result of one successful authentication round trip.
#[derive(Debug)]
pub struct AuthOutcome {
    /// Issued token
    pub token: SecretString,
    /// Endpoint of the selected service
    pub endpoint: ServiceEndpoint,
    /// Every endpoint the auth service advertised
    pub catalog: EndpointCatalog,
    /// Token expiry, when the auth service reports one
    pub token_expires: Option<DateTime<Utc>>,
}

/// Performs one authentication round trip.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Authenticate with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] when credentials are rejected or the
    /// answer is unusable, and [`Error::Connection`] when the auth host is
    /// unreachable.
    async fn authenticate(&self) -> Result<AuthOutcome>;

    /// Protocol spoken by this strategy.
    fn version(&self) -> AuthVersion;
}

/// Build the strategy matching the configured auth URL.
#[must_use]
pub fn strategy_for(
    config: Arc<ConnectionConfig>,
    connector: Arc<dyn Connector>,
) -> Arc<dyn AuthStrategy> {
    match AuthVersion::detect(config.auth_path()) {
        AuthVersion::V1 => Arc::new(V1Auth::new(config, connector)),
        AuthVersion::V2 => Arc::new(V2Auth::new(config, connector)),
    }
}

/// Send a request to the auth host over a one-off transport.
async fn send_auth_request(
    connector: &dyn Connector,
    endpoint: &ServiceEndpoint,
    request: TransportRequest,
) -> Result<Response> {
    let mut transport = connector.connect(endpoint).await?;
    transport.send(request).await.map_err(|err| {
        warn!(host = %endpoint.host, error = %err, "auth request failed");
        Error::Connection(format!("Unable to connect to {}", endpoint.host))
    })
}

fn rejected(response: &Response) -> Error {
    Error::Authentication {
        message: format!(
            "Authentication failed with response code {}",
            response.status()
        ),
        status: Some(response.status()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionOptions;
    use crate::transport::{MockConnector, MockTransport, TransportError};

    #[test]
    fn test_detect_version() {
        assert_eq!(AuthVersion::detect("/v2.0"), AuthVersion::V2);
        assert_eq!(AuthVersion::detect("/v2.0/"), AuthVersion::V2);
        assert_eq!(AuthVersion::detect("/identity/v2.0"), AuthVersion::V2);
        assert_eq!(AuthVersion::detect("/v1.0"), AuthVersion::V1);
        assert_eq!(AuthVersion::detect("/auth"), AuthVersion::V1);
        assert_eq!(AuthVersion::detect("/"), AuthVersion::V1);
        assert_eq!(AuthVersion::detect("/v2.0/tokens"), AuthVersion::V1);
    }

    #[test]
    fn test_strategy_for_url() {
        let connector: Arc<dyn Connector> = Arc::new(MockConnector::new());

        let config = ConnectionOptions::new("u", "k", "http://a.b.c/v2.0/")
            .into_config()
            .unwrap();
        let strategy = strategy_for(Arc::new(config), Arc::clone(&connector));
        assert_eq!(strategy.version(), AuthVersion::V2);

        let config = ConnectionOptions::new("u", "k", "https://a.b.c/v1.0")
            .into_config()
            .unwrap();
        let strategy = strategy_for(Arc::new(config), connector);
        assert_eq!(strategy.version(), AuthVersion::V1);
    }

    #[tokio::test]
    async fn test_send_failure_is_connection_error() {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut transport = MockTransport::new();
            transport
                .expect_send()
                .returning(|_| Err(TransportError::Connect("refused".to_string())));
            Ok(Box::new(transport))
        });

        let endpoint = ServiceEndpoint::parse("http://a.b.c/v1.0").unwrap();
        let request = TransportRequest {
            method: crate::transport::HttpMethod::Get,
            url: endpoint.url_for("/v1.0").unwrap(),
            headers: reqwest::header::HeaderMap::new(),
            body: crate::transport::RequestBody::Empty,
        };

        let err = send_auth_request(&connector, &endpoint, request)
            .await
            .unwrap_err();
        assert_eq!(err, Error::Connection("Unable to connect to a.b.c".to_string()));
    }
}
