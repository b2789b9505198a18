//! Header-based (version 1) authentication.

use super::{rejected, send_auth_request, AuthOutcome, AuthStrategy, AuthVersion};
use crate::catalog::EndpointCatalog;
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::transport::{
    base_headers, sensitive_header, Connector, HttpMethod, RequestBody, Response,
    TransportRequest,
};
use crate::types::{ServiceEndpoint, ServiceType};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::info;

const MANAGEMENT_URL_HEADER: &str = "x-server-management-url";
const STORAGE_URL_HEADER: &str = "x-storage-url";

/// Legacy auth: `GET <auth path>` with `X-Auth-User`/`X-Auth-Key`, service URL
/// returned in a response header.
pub struct V1Auth {
    config: Arc<ConnectionConfig>,
    connector: Arc<dyn Connector>,
}

impl V1Auth {
    /// Create the strategy.
    #[must_use]
    pub fn new(config: Arc<ConnectionConfig>, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    fn request(&self) -> Result<TransportRequest> {
        let mut headers = base_headers(&self.config.client.user_agent)?;
        headers.insert("x-auth-user", sensitive_header(&self.config.username)?);
        headers.insert(
            "x-auth-key",
            sensitive_header(self.config.api_key.expose_secret())?,
        );

        Ok(TransportRequest {
            method: HttpMethod::Get,
            url: self.config.auth_url.clone(),
            headers,
            body: RequestBody::Empty,
        })
    }

    fn service_endpoint(&self, response: &Response) -> Result<ServiceEndpoint> {
        let header = match self.config.service_type {
            ServiceType::Compute => Some(MANAGEMENT_URL_HEADER),
            ServiceType::ObjectStore => Some(STORAGE_URL_HEADER),
            _ => None,
        };

        header
            .and_then(|name| response.header(name))
            .and_then(|url| ServiceEndpoint::parse(url).ok())
            .ok_or_else(|| Error::Authentication {
                message: format!(
                    "Unexpected response from {} - couldn't get service URLs: \
                     \"{MANAGEMENT_URL_HEADER}\" is: {} and \"{STORAGE_URL_HEADER}\" is: {}",
                    self.config.auth_endpoint.host,
                    response.header(MANAGEMENT_URL_HEADER).unwrap_or_default(),
                    response.header(STORAGE_URL_HEADER).unwrap_or_default(),
                ),
                status: Some(response.status()),
            })
    }
}

#[async_trait]
impl AuthStrategy for V1Auth {
    async fn authenticate(&self) -> Result<AuthOutcome> {
        let request = self.request()?;
        let response =
            send_auth_request(self.connector.as_ref(), &self.config.auth_endpoint, request)
                .await?;

        if !response.is_success() {
            return Err(rejected(&response));
        }

        let token = response
            .header("x-auth-token")
            .filter(|token| !token.is_empty())
            .map(|token| SecretString::from(token.to_string()))
            .ok_or_else(|| Error::Authentication {
                message: "Auth response did not include an X-Auth-Token header".to_string(),
                status: Some(response.status()),
            })?;
        let endpoint = self.service_endpoint(&response)?;

        info!(
            auth_host = %self.config.auth_endpoint.host,
            service_host = %endpoint.host,
            "authenticated (v1)"
        );

        Ok(AuthOutcome {
            token,
            endpoint,
            catalog: EndpointCatalog::new(),
            token_expires: None,
        })
    }

    fn version(&self) -> AuthVersion {
        AuthVersion::V1
    }
}
