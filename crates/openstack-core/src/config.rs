//! Connection configuration.
//!
//! [`ConnectionOptions`] is the loosely-typed record callers fill in (by hand,
//! through the `with_*` builders, or by deserializing a config file).
//! [`ConnectionOptions::into_config`] checks it and produces the immutable
//! [`ConnectionConfig`] a connection is built from.

use crate::client::{ClientConfig, ProxyConfig, RetryPolicy};
use crate::error::{Error, Result};
use crate::types::{ServiceEndpoint, ServiceType};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Credential block sent to a version 2 auth service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    /// `passwordCredentials` (username + password)
    #[default]
    Password,
    /// `apiAccessKeyCredentials` (access key + secret key)
    Key,
    /// Rackspace `RAX-KSKEY:apiKeyCredentials` (username + API key)
    RaxKsKey,
}

impl AuthMethod {
    /// Returns the option value naming this method.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Key => "key",
            Self::RaxKsKey => "rax-kskey",
        }
    }
}

impl FromStr for AuthMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "password" => Ok(Self::Password),
            "key" => Ok(Self::Key),
            "rax-kskey" => Ok(Self::RaxKsKey),
            _ => Err(Error::InvalidArgument(format!(
                "Unrecognized :auth_method parameter: {s}"
            ))),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant (project) scope requested at authentication time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantSelector {
    /// Select by tenant name
    Name(String),
    /// Select by tenant id
    Id(String),
}

impl TenantSelector {
    /// JSON key carrying the selector in a version 2 auth body.
    #[must_use]
    pub const fn json_key(&self) -> &'static str {
        match self {
            Self::Name(_) => "tenantName",
            Self::Id(_) => "tenantId",
        }
    }

    /// The tenant name or id.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Name(value) | Self::Id(value) => value,
        }
    }
}

/// Which block wins when a catalog lists the same service at several versions.
///
/// `Lowest` keeps the current selection whenever a later block carries a
/// strictly higher version. `Highest` keeps it whenever a later block carries
/// a strictly lower one. Equal versions always let the later block win.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPreference {
    /// Prefer the lowest version seen
    #[default]
    Lowest,
    /// Prefer the highest version seen
    Highest,
}

impl VersionPreference {
    /// Whether a later block at `candidate` must be skipped in favour of the
    /// block already selected at `current`.
    #[must_use]
    pub fn keeps_current(&self, current: f64, candidate: f64) -> bool {
        match self {
            Self::Lowest => candidate > current,
            Self::Highest => candidate < current,
        }
    }
}

/// Options accepted when creating a connection.
#[derive(Debug, Deserialize, Validate)]
pub struct ConnectionOptions {
    /// Account user name
    #[serde(default)]
    pub username: Option<String>,

    /// API key or password
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,

    /// Auth service URL; a path ending in `v2.0` selects the version 2 protocol
    #[serde(default)]
    pub auth_url: Option<String>,

    /// `password`, `key` or `rax-kskey`
    #[serde(default)]
    pub auth_method: Option<String>,

    /// Tenant name
    #[serde(default)]
    pub tenant_name: Option<String>,

    /// Tenant id, takes precedence over `tenant_name`
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Service family to bind the connection to
    #[serde(default)]
    pub service_type: Option<String>,

    /// Catalog service name to match, when several services share a type
    #[serde(default)]
    pub service_name: Option<String>,

    /// Region to select from the catalog
    #[serde(default)]
    pub region: Option<String>,

    /// Re-authenticate and retry once when a request answers 401
    #[serde(default = "default_retry_auth_on_expiry")]
    pub retry_auth_on_expiry: bool,

    /// HTTP proxy host
    #[serde(default)]
    pub proxy_host: Option<String>,

    /// HTTP proxy port
    #[serde(default)]
    pub proxy_port: Option<u16>,

    /// Tie-break between catalog blocks of different versions
    #[serde(default)]
    pub version_preference: VersionPreference,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to custom CA certificate
    #[serde(default)]
    pub tls_ca_cert: Option<PathBuf>,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Reconnects allowed after a transport failure
    #[validate(range(min = 0, max = 10))]
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Dump request and response bodies at debug level
    #[serde(default)]
    pub enable_logging: bool,
}

const fn default_retry_auth_on_expiry() -> bool {
    true
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_request_timeout_secs() -> u64 {
    crate::client::DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_max_reconnect_attempts() -> u32 {
    crate::client::DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(SecretString::from))
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::MissingArgument(name.to_string()))
}

impl ConnectionOptions {
    /// Create options with the three required values set.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        api_key: impl Into<String>,
        auth_url: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            api_key: Some(SecretString::from(api_key.into())),
            auth_url: Some(auth_url.into()),
            ..Self::default()
        }
    }

    /// Set the auth method (`password`, `key` or `rax-kskey`).
    #[must_use]
    pub fn with_auth_method(mut self, method: impl Into<String>) -> Self {
        self.auth_method = Some(method.into());
        self
    }

    /// Select the tenant by name.
    #[must_use]
    pub fn with_tenant_name(mut self, name: impl Into<String>) -> Self {
        self.tenant_name = Some(name.into());
        self
    }

    /// Select the tenant by id.
    #[must_use]
    pub fn with_tenant_id(mut self, id: impl Into<String>) -> Self {
        self.tenant_id = Some(id.into());
        self
    }

    /// Set the service type (e.g. `compute`, `object-store`).
    #[must_use]
    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }

    /// Set the catalog service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Enable or disable re-authentication on 401.
    #[must_use]
    pub const fn with_retry_auth_on_expiry(mut self, retry: bool) -> Self {
        self.retry_auth_on_expiry = retry;
        self
    }

    /// Route every connection through an HTTP proxy.
    #[must_use]
    pub fn with_proxy(mut self, host: impl Into<String>, port: Option<u16>) -> Self {
        self.proxy_host = Some(host.into());
        self.proxy_port = port;
        self
    }

    /// Set the catalog version tie-break.
    #[must_use]
    pub const fn with_version_preference(mut self, preference: VersionPreference) -> Self {
        self.version_preference = preference;
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set custom CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Set request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    /// Set the number of reconnects allowed after a transport failure.
    #[must_use]
    pub const fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Enable request and response body logging.
    #[must_use]
    pub const fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    /// Check the options and build the immutable connection configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingArgument`] if `username`, `api_key` or `auth_url`
    /// is absent, and [`Error::InvalidArgument`] for a malformed URL, an unknown
    /// service type or auth method, or an out-of-range numeric option.
    pub fn into_config(self) -> Result<ConnectionConfig> {
        self.validate()?;

        let username = required(self.username, "username")?;
        let api_key = self
            .api_key
            .ok_or_else(|| Error::MissingArgument("api_key".to_string()))?;
        let raw_auth_url = required(self.auth_url, "auth_url")?;

        let auth_url = Url::parse(&raw_auth_url).map_err(|err| {
            Error::InvalidArgument(format!("Invalid :auth_url parameter: {raw_auth_url} ({err})"))
        })?;
        let auth_endpoint = ServiceEndpoint::from_url(&auth_url).map_err(|_| {
            Error::InvalidArgument(format!("Invalid :auth_url parameter: {raw_auth_url}"))
        })?;

        let auth_method = match self.auth_method.as_deref() {
            Some(method) => method.parse()?,
            None => AuthMethod::default(),
        };
        let service_type = match self.service_type.as_deref() {
            Some(service) => service.parse()?,
            None => ServiceType::default(),
        };

        let tenant = match (self.tenant_id, self.tenant_name) {
            (Some(id), _) => TenantSelector::Id(id),
            (None, Some(name)) => TenantSelector::Name(name),
            (None, None) => TenantSelector::Name(username.clone()),
        };

        let retry_policy = RetryPolicy::new().with_max_reconnects(self.max_reconnect_attempts);
        let mut client = ClientConfig::new()
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_retry_policy(retry_policy)
            .with_tls_verify(self.tls_verify)
            .with_logging(self.enable_logging);
        if let Some(path) = self.tls_ca_cert {
            client = client.with_ca_cert(path);
        }
        if let Some(host) = self.proxy_host.filter(|host| !host.is_empty()) {
            client = client.with_proxy(ProxyConfig::new(host, self.proxy_port));
        }

        Ok(ConnectionConfig {
            username,
            api_key,
            auth_url,
            auth_endpoint,
            auth_method,
            tenant,
            service_type,
            service_name: self.service_name.filter(|name| !name.is_empty()),
            region: self.region.filter(|region| !region.is_empty()),
            retry_auth_on_expiry: self.retry_auth_on_expiry,
            version_preference: self.version_preference,
            client,
        })
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            username: None,
            api_key: None,
            auth_url: None,
            auth_method: None,
            tenant_name: None,
            tenant_id: None,
            service_type: None,
            service_name: None,
            region: None,
            retry_auth_on_expiry: default_retry_auth_on_expiry(),
            proxy_host: None,
            proxy_port: None,
            version_preference: VersionPreference::default(),
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            enable_logging: false,
        }
    }
}

/// Checked, immutable configuration of one connection.
#[derive(Debug)]
pub struct ConnectionConfig {
    /// Account user name
    pub username: String,
    /// API key or password
    pub api_key: SecretString,
    /// Full auth service URL
    pub auth_url: Url,
    /// Auth service location
    pub auth_endpoint: ServiceEndpoint,
    /// Credential block used by version 2 auth
    pub auth_method: AuthMethod,
    /// Tenant scope
    pub tenant: TenantSelector,
    /// Service family the connection is bound to
    pub service_type: ServiceType,
    /// Catalog service name filter
    pub service_name: Option<String>,
    /// Catalog region filter
    pub region: Option<String>,
    /// Re-authenticate and retry once on 401
    pub retry_auth_on_expiry: bool,
    /// Catalog version tie-break
    pub version_preference: VersionPreference,
    /// HTTP engine settings
    pub client: ClientConfig,
}

impl ConnectionConfig {
    /// Path of the auth service URL.
    #[must_use]
    pub fn auth_path(&self) -> &str {
        self.auth_url.path()
    }
}
