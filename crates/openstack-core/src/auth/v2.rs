//! Token API (version 2.0) authentication and catalog endpoint selection.

use super::{rejected, send_auth_request, AuthOutcome, AuthStrategy, AuthVersion};
use crate::catalog::{version_from_url, EndpointCatalog};
use crate::config::{AuthMethod, ConnectionConfig, VersionPreference};
use crate::error::{ApiError, Error, FaultKind, Result};
use crate::transport::{base_headers, Connector, HttpMethod, RequestBody, TransportRequest};
use crate::types::ServiceEndpoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogService>,
}

#[derive(Debug, Deserialize)]
struct Token {
    id: String,
    #[serde(default)]
    expires: Option<String>,
}

/// One service block of a version 2 catalog.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CatalogService {
    #[serde(rename = "type")]
    pub(crate) service_type: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CatalogEndpoint {
    #[serde(default)]
    pub(crate) region: Option<String>,
    #[serde(rename = "publicURL", default)]
    pub(crate) public_url: Option<String>,
    #[serde(rename = "versionId", default)]
    pub(crate) version_id: Option<Value>,
}

impl CatalogEndpoint {
    fn version_id(&self) -> Option<String> {
        match self.version_id.as_ref()? {
            Value::String(version) => Some(version.clone()),
            Value::Number(version) => Some(version.to_string()),
            _ => None,
        }
    }
}

impl CatalogService {
    /// Version of the block, taken from its first endpoint.
    fn version(&self) -> f64 {
        let Some(first) = self.endpoints.first() else {
            return 0.0;
        };
        first
            .version_id()
            .and_then(|version| version.parse().ok())
            .or_else(|| first.public_url.as_deref().and_then(version_from_url))
            .unwrap_or(0.0)
    }
}

/// Criteria used to pick one endpoint out of a catalog.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Selector<'a> {
    pub(crate) service_type: &'a str,
    pub(crate) service_name: Option<&'a str>,
    pub(crate) region: Option<&'a str>,
    pub(crate) preference: VersionPreference,
}

/// Walk the catalog in order and return the endpoint to bind to.
///
/// Blocks must match the type and, when configured, the name. Within a block
/// the last endpoint in the requested region (compared case-insensitively)
/// is taken, or the first endpoint when no region is requested. A later block
/// replaces the current choice unless the version preference says otherwise.
pub(crate) fn select_endpoint(
    services: &[CatalogService],
    selector: Selector<'_>,
) -> Option<ServiceEndpoint> {
    let mut selected: Option<(f64, ServiceEndpoint)> = None;

    for service in services {
        if service.service_type != selector.service_type {
            continue;
        }
        if let Some(name) = selector.service_name {
            if service.name.as_deref() != Some(name) {
                continue;
            }
        }

        let candidate = match selector.region {
            Some(region) => service.endpoints.iter().rfind(|endpoint| {
                endpoint
                    .region
                    .as_deref()
                    .is_some_and(|r| r.eq_ignore_ascii_case(region))
            }),
            None => service.endpoints.first(),
        };
        let Some(candidate) = candidate else {
            continue;
        };
        let Some(endpoint) = candidate
            .public_url
            .as_deref()
            .and_then(|url| ServiceEndpoint::parse(url).ok())
        else {
            warn!(
                service_type = %service.service_type,
                public_url = ?candidate.public_url,
                "skipping catalog endpoint without a usable publicURL"
            );
            continue;
        };

        let version = service.version();
        if let Some((current, _)) = &selected {
            if selector.preference.keeps_current(*current, version) {
                debug!(current, version, "keeping previously selected catalog block");
                continue;
            }
        }
        selected = Some((version, endpoint));
    }

    selected.map(|(_, endpoint)| endpoint)
}

fn record_catalog(services: &[CatalogService]) -> EndpointCatalog {
    let mut catalog = EndpointCatalog::new();
    for service in services {
        for endpoint in &service.endpoints {
            catalog.record(
                endpoint.region.as_deref(),
                &service.service_type,
                endpoint.version_id().as_deref(),
            );
        }
    }
    catalog
}

fn parse_expiry(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(expires) => Some(expires.with_timezone(&Utc)),
        Err(err) => {
            debug!(expires = raw, error = %err, "ignoring unparsable token expiry");
            None
        }
    }
}

/// Token API auth: `POST <auth path>/tokens` with a JSON credential block.
pub struct V2Auth {
    config: Arc<ConnectionConfig>,
    connector: Arc<dyn Connector>,
}

impl V2Auth {
    /// Create the strategy.
    #[must_use]
    pub fn new(config: Arc<ConnectionConfig>, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    fn credentials(&self) -> Value {
        let username = self.config.username.as_str();
        let key = self.config.api_key.expose_secret();

        let mut auth = match self.config.auth_method {
            AuthMethod::Password => json!({
                "passwordCredentials": {"username": username, "password": key}
            }),
            AuthMethod::Key => json!({
                "apiAccessKeyCredentials": {"accessKey": username, "secretKey": key}
            }),
            AuthMethod::RaxKsKey => json!({
                "RAX-KSKEY:apiKeyCredentials": {"username": username, "apiKey": key}
            }),
        };

        if self.config.auth_method != AuthMethod::RaxKsKey {
            if let Value::Object(map) = &mut auth {
                let tenant = &self.config.tenant;
                map.insert(
                    tenant.json_key().to_string(),
                    Value::String(tenant.value().to_string()),
                );
            }
        }

        json!({ "auth": auth })
    }

    fn request(&self) -> Result<TransportRequest> {
        let path = format!("{}/tokens", self.config.auth_path().trim_end_matches('/'));
        let url = self.config.auth_endpoint.url_for(&path)?;

        let mut headers = base_headers(&self.config.client.user_agent)?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(TransportRequest {
            method: HttpMethod::Post,
            url,
            headers,
            body: RequestBody::json(&self.credentials())?,
        })
    }

    fn selector(&self) -> Selector<'_> {
        Selector {
            service_type: self.config.service_type.name(),
            service_name: self.config.service_name.as_deref(),
            region: self.config.region.as_deref(),
            preference: self.config.version_preference,
        }
    }
}

#[async_trait]
impl AuthStrategy for V2Auth {
    async fn authenticate(&self) -> Result<AuthOutcome> {
        let request = self.request()?;
        let response =
            send_auth_request(self.connector.as_ref(), &self.config.auth_endpoint, request)
                .await?;

        if !response.is_success() {
            return Err(rejected(&response));
        }

        let raw: Value = response.json()?;
        let parsed: TokenResponse = serde_json::from_value(raw.clone())?;
        let services = parsed.access.service_catalog;
        let wanted = self.config.service_type.name();

        if !services.iter().any(|service| service.service_type == wanted) {
            let catalog_body = raw
                .pointer("/access/serviceCatalog")
                .map(Value::to_string)
                .unwrap_or_default();
            return Err(Error::Api(ApiError::new(
                FaultKind::NotImplemented,
                format!(
                    "The requested service: \"{wanted}\" is not present in the returned service catalogue."
                ),
                501,
                catalog_body,
            )));
        }

        let catalog = record_catalog(&services);
        let endpoint = select_endpoint(&services, self.selector()).ok_or_else(|| {
            Error::Authentication {
                message: format!(
                    "No API endpoint for region {} / service type {wanted}",
                    self.config.region.as_deref().unwrap_or_default()
                ),
                status: Some(response.status()),
            }
        })?;
        let token_expires = parse_expiry(parsed.access.token.expires.as_deref());

        info!(
            auth_host = %self.config.auth_endpoint.host,
            service_host = %endpoint.host,
            region = ?self.config.region,
            "authenticated (v2.0)"
        );

        Ok(AuthOutcome {
            token: SecretString::from(parsed.access.token.id),
            endpoint,
            catalog,
            token_expires,
        })
    }

    fn version(&self) -> AuthVersion {
        AuthVersion::V2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionOptions;
    use crate::transport::{MockConnector, MockTransport, Response};
    use reqwest::header::HeaderMap;

    fn services(value: Value) -> Vec<CatalogService> {
        serde_json::from_value(value).unwrap()
    }

    fn selector<'a>(region: Option<&'a str>) -> Selector<'a> {
        Selector {
            service_type: "compute",
            service_name: None,
            region,
            preference: VersionPreference::Lowest,
        }
    }

    fn two_region_catalog() -> Value {
        json!([
            {"type": "identity", "name": "keystone", "endpoints": [
                {"region": "North", "publicURL": "https://identity.north.host/v2.0", "versionId": "2.0"}
            ]},
            {"type": "compute", "name": "nova", "endpoints": [
                {"region": "North", "publicURL": "https://compute.north.host/v1.1/3456", "versionId": "1.1"},
                {"region": "south", "publicURL": "https://compute.south.host/v1.1/3456", "versionId": "1.1"}
            ]}
        ])
    }

    #[test]
    fn test_region_match_is_case_insensitive() {
        let catalog = services(two_region_catalog());

        let endpoint = select_endpoint(&catalog, selector(Some("South"))).unwrap();
        assert_eq!(endpoint.host, "compute.south.host");
        assert_eq!(endpoint.path, "/v1.1/3456");

        let endpoint = select_endpoint(&catalog, selector(Some("NORTH"))).unwrap();
        assert_eq!(endpoint.host, "compute.north.host");
    }

    #[test]
    fn test_last_endpoint_in_region_wins() {
        let catalog = services(json!([
            {"type": "compute", "name": "nova", "endpoints": [
                {"region": "South", "publicURL": "https://compute-a.south.host/v1.1/1", "versionId": "1.1"},
                {"region": "North", "publicURL": "https://compute.north.host/v1.1/1", "versionId": "1.1"},
                {"region": "SOUTH", "publicURL": "https://compute-b.south.host/v1.1/1", "versionId": "1.1"}
            ]}
        ]));

        let endpoint = select_endpoint(&catalog, selector(Some("south"))).unwrap();
        assert_eq!(endpoint.host, "compute-b.south.host");
    }

    #[test]
    fn test_no_region_takes_first_endpoint() {
        let catalog = services(two_region_catalog());
        let endpoint = select_endpoint(&catalog, selector(None)).unwrap();
        assert_eq!(endpoint.host, "compute.north.host");
    }

    #[test]
    fn test_unknown_region_selects_nothing() {
        let catalog = services(two_region_catalog());
        assert!(select_endpoint(&catalog, selector(Some("West"))).is_none());
    }

    fn versioned_blocks(first: &str, second: &str) -> Vec<CatalogService> {
        services(json!([
            {"type": "compute", "name": "nova", "endpoints": [
                {"region": "az-1", "publicURL": format!("https://compute-{first}.host/v{first}/1"), "versionId": first}
            ]},
            {"type": "compute", "name": "nova", "endpoints": [
                {"region": "az-1", "publicURL": format!("https://compute-{second}.host/v{second}/1"), "versionId": second}
            ]}
        ]))
    }

    #[test]
    fn test_lowest_version_wins_in_either_order() {
        let ascending = versioned_blocks("1.0", "1.1");
        let descending = versioned_blocks("1.1", "1.0");

        let a = select_endpoint(&ascending, selector(None)).unwrap();
        let d = select_endpoint(&descending, selector(None)).unwrap();
        assert_eq!(a.host, "compute-1.0.host");
        assert_eq!(a, d);
    }

    #[test]
    fn test_highest_preference() {
        let mut highest = selector(None);
        highest.preference = VersionPreference::Highest;

        let a = select_endpoint(&versioned_blocks("1.0", "1.1"), highest).unwrap();
        let d = select_endpoint(&versioned_blocks("1.1", "1.0"), highest).unwrap();
        assert_eq!(a.host, "compute-1.1.host");
        assert_eq!(a, d);
    }

    #[test]
    fn test_equal_versions_later_block_wins() {
        let mut catalog = versioned_blocks("1.1", "1.1");
        catalog[1].endpoints[0].public_url = Some("https://later.host/v1.1/1".to_string());

        let endpoint = select_endpoint(&catalog, selector(None)).unwrap();
        assert_eq!(endpoint.host, "later.host");
    }

    #[test]
    fn test_version_from_public_url_when_id_missing() {
        let catalog = services(json!([
            {"type": "compute", "name": "nova", "endpoints": [
                {"publicURL": "https://old.host/v1.1/1"}
            ]},
            {"type": "compute", "name": "nova", "endpoints": [
                {"publicURL": "https://new.host/v2.0/1"}
            ]}
        ]));
        assert!((catalog[0].version() - 1.1).abs() < f64::EPSILON);
        assert!((catalog[1].version() - 2.0).abs() < f64::EPSILON);

        let endpoint = select_endpoint(&catalog, selector(None)).unwrap();
        assert_eq!(endpoint.host, "old.host");
    }

    #[test]
    fn test_service_name_filter() {
        let catalog = services(json!([
            {"type": "compute", "name": "cloudServers", "endpoints": [
                {"publicURL": "https://legacy.host/v1.0/1"}
            ]},
            {"type": "compute", "name": "cloudServersOpenStack", "endpoints": [
                {"publicURL": "https://next.host/v2/1"}
            ]}
        ]));

        let mut named = selector(None);
        named.service_name = Some("cloudServersOpenStack");
        assert_eq!(select_endpoint(&catalog, named).unwrap().host, "next.host");

        named.service_name = Some("missing");
        assert!(select_endpoint(&catalog, named).is_none());
    }

    #[test]
    fn test_record_catalog_includes_every_service() {
        let catalog = record_catalog(&services(two_region_catalog()));
        assert_eq!(catalog.entries("North").len(), 2);
        assert_eq!(catalog.entries("North")[0].service_type, "identity");
        assert_eq!(catalog.entries("North")[0].version.as_deref(), Some("2.0"));
        assert_eq!(catalog.entries("south").len(), 1);
    }

    #[test]
    fn test_parse_expiry() {
        let expires = parse_expiry(Some("2012-06-07T18:05:40Z")).unwrap();
        assert_eq!(expires.to_rfc3339(), "2012-06-07T18:05:40+00:00");
        assert!(parse_expiry(Some("tomorrow")).is_none());
        assert!(parse_expiry(None).is_none());
    }

    fn auth(options: ConnectionOptions, connector: MockConnector) -> V2Auth {
        V2Auth::new(Arc::new(options.into_config().unwrap()), Arc::new(connector))
    }

    fn body_of(request: &TransportRequest) -> Value {
        match &request.body {
            RequestBody::Bytes(bytes) => serde_json::from_slice(bytes).unwrap(),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_credential_shapes() {
        let base = || ConnectionOptions::new("u", "k", "http://a.b.c/v2.0/");

        let request = auth(base().with_tenant_name("t"), MockConnector::new())
            .request()
            .unwrap();
        assert_eq!(request.url.as_str(), "http://a.b.c/v2.0/tokens");
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            body_of(&request),
            json!({"auth": {"passwordCredentials": {"username": "u", "password": "k"}, "tenantName": "t"}})
        );

        let request = auth(
            base().with_auth_method("key").with_tenant_id("42"),
            MockConnector::new(),
        )
        .request()
        .unwrap();
        assert_eq!(
            body_of(&request),
            json!({"auth": {"apiAccessKeyCredentials": {"accessKey": "u", "secretKey": "k"}, "tenantId": "42"}})
        );

        let request = auth(
            base().with_auth_method("rax-kskey").with_tenant_name("ignored"),
            MockConnector::new(),
        )
        .request()
        .unwrap();
        assert_eq!(
            body_of(&request),
            json!({"auth": {"RAX-KSKEY:apiKeyCredentials": {"username": "u", "apiKey": "k"}}})
        );
    }

    fn connector_answering(status: u16, body: Value) -> MockConnector {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(move |_| {
            let body = body.to_string();
            let mut transport = MockTransport::new();
            transport
                .expect_send()
                .withf(|request| request.url.path() == "/v2.0/tokens")
                .times(1)
                .returning(move |_| Ok(Response::new(status, HeaderMap::new(), body.clone())));
            Ok(Box::new(transport))
        });
        connector
    }

    fn token_body(catalog: Value) -> Value {
        json!({"access": {
            "token": {"id": "tok-1", "expires": "2030-01-01T00:00:00Z"},
            "serviceCatalog": catalog
        }})
    }

    #[tokio::test]
    async fn test_authenticate_selects_south() {
        let connector = connector_answering(200, token_body(two_region_catalog()));
        let strategy = auth(
            ConnectionOptions::new("u", "k", "http://a.b.c/v2.0").with_region("South"),
            connector,
        );

        let outcome = strategy.authenticate().await.unwrap();
        assert_eq!(outcome.token.expose_secret(), "tok-1");
        assert_eq!(outcome.endpoint.host, "compute.south.host");
        assert_eq!(outcome.endpoint.port, 443);
        assert_eq!(outcome.catalog.len(), 3);
        assert!(outcome.token_expires.is_some());
        assert_eq!(strategy.version(), AuthVersion::V2);
    }

    #[tokio::test]
    async fn test_missing_service_type_is_not_implemented() {
        let connector = connector_answering(200, token_body(two_region_catalog()));
        let strategy = auth(
            ConnectionOptions::new("u", "k", "http://a.b.c/v2.0").with_service_type("volume"),
            connector,
        );

        let err = strategy.authenticate().await.unwrap_err();
        assert_eq!(err.fault_kind(), Some(FaultKind::NotImplemented));
        assert_eq!(err.status(), Some(501));
        match &err {
            Error::Api(api) => {
                assert_eq!(
                    api.message,
                    "The requested service: \"volume\" is not present in the returned service catalogue."
                );
                assert!(api.body.contains("compute.south.host"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_endpoint_for_region() {
        let connector = connector_answering(200, token_body(two_region_catalog()));
        let strategy = auth(
            ConnectionOptions::new("u", "k", "http://a.b.c/v2.0").with_region("West"),
            connector,
        );

        let err = strategy.authenticate().await.unwrap_err();
        match err {
            Error::Authentication { message, .. } => {
                assert_eq!(message, "No API endpoint for region West / service type compute");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_credentials_carry_status() {
        let connector = connector_answering(401, json!({"unauthorized": {"message": "nope"}}));
        let strategy = auth(ConnectionOptions::new("u", "k", "http://a.b.c/v2.0"), connector);

        let err = strategy.authenticate().await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(matches!(err, Error::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_malformed_token_response() {
        let connector = connector_answering(200, json!({"access": {}}));
        let strategy = auth(ConnectionOptions::new("u", "k", "http://a.b.c/v2.0"), connector);

        let err = strategy.authenticate().await.unwrap_err();
        assert!(matches!(err, Error::ResponseParse(_)));
    }
}
