//! Core OpenStack domain types.
//!
//! This module defines the service families the library can target and the
//! resolved endpoint every request is addressed to.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Default port for plain HTTP endpoints.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default port for HTTPS endpoints.
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// OpenStack service families addressable through a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    /// Compute (Nova)
    #[default]
    Compute,
    /// Object storage (Swift)
    ObjectStore,
    /// Block storage (Cinder)
    Volume,
    /// Image (Glance)
    Image,
    /// Networking (Neutron / Quantum)
    Network,
    /// Identity (Keystone)
    Identity,
    /// Metering (Ceilometer)
    Metering,
}

impl ServiceType {
    /// Returns the catalog type string for this service.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::ObjectStore => "object-store",
            Self::Volume => "volume",
            Self::Image => "image",
            Self::Network => "network",
            Self::Identity => "identity",
            Self::Metering => "metering",
        }
    }

    /// Returns all supported service types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Compute,
            Self::ObjectStore,
            Self::Volume,
            Self::Image,
            Self::Network,
            Self::Identity,
            Self::Metering,
        ]
    }

    /// Object-storage deployments also expect the token in `X-Storage-Token`.
    #[must_use]
    pub const fn uses_storage_token(&self) -> bool {
        matches!(self, Self::ObjectStore)
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "compute" => Ok(Self::Compute),
            "object-store" => Ok(Self::ObjectStore),
            "volume" => Ok(Self::Volume),
            "image" => Ok(Self::Image),
            "network" => Ok(Self::Network),
            "identity" => Ok(Self::Identity),
            "metering" => Ok(Self::Metering),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid :service_type parameter: {s}"
            ))),
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// URL scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP
    Http,
    /// HTTP over TLS
    Https,
}

impl Scheme {
    /// Returns the scheme as it appears in a URL.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Port implied by the scheme when a URL omits one.
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Http => DEFAULT_HTTP_PORT,
            Self::Https => DEFAULT_HTTPS_PORT,
        }
    }

    /// Whether connections use TLS.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        matches!(self, Self::Https)
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => Err(Error::InvalidArgument(format!("Unsupported URL scheme: {s}"))),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved base location of a service: scheme, host, port and path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// URL scheme
    pub scheme: Scheme,
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Path prefix applied to every convenience request (no trailing slash)
    pub path: String,
}

impl ServiceEndpoint {
    /// Create an endpoint from its parts.
    #[must_use]
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            scheme,
            host: host.into(),
            port,
            path: path.trim_end_matches('/').to_string(),
        }
    }

    /// Build an endpoint from a parsed URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the URL has no host or an unsupported scheme.
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::InvalidArgument(format!("URL `{url}` has no host")))?;
        let scheme: Scheme = url.scheme().parse()?;
        let port = url.port().unwrap_or_else(|| scheme.default_port());

        Ok(Self::new(scheme, host, port, url.path()))
    }

    /// Parse an endpoint from a URL string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the string is not a usable URL.
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|err| Error::InvalidArgument(format!("Invalid URL `{url}`: {err}")))?;
        Self::from_url(&parsed)
    }

    /// Key used to share one pooled transport per host.
    #[must_use]
    pub fn pool_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Origin (`scheme://host:port`) without any path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the host cannot form a URL.
    pub fn origin(&self) -> Result<Url> {
        let raw = format!("{}://{}:{}/", self.scheme, self.host, self.port);
        Url::parse(&raw)
            .map_err(|err| Error::InvalidArgument(format!("Invalid endpoint `{raw}`: {err}")))
    }

    /// Absolute URL for a path on this endpoint's host.
    ///
    /// The path is used as given; any query string it carries is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the resulting URL is malformed or
    /// would leave this endpoint's host and port.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        let origin = self.origin()?;
        let absolute = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let url = origin
            .join(&absolute)
            .map_err(|err| Error::InvalidArgument(format!("Invalid request path `{path}`: {err}")))?;

        // `//host/...` and `/\host/...` join as scheme-relative references.
        if url.host_str() != origin.host_str()
            || url.port_or_known_default() != origin.port_or_known_default()
        {
            return Err(Error::InvalidArgument(format!(
                "Request path `{path}` leaves host {}",
                self.host
            )));
        }
        Ok(url)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}
