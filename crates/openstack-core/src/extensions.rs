//! API extension discovery.
//!
//! Deployments advertise optional capabilities under `<service path>/extensions`.
//! The list is fetched once per [`Connection`] and consulted from then on.

use crate::connection::{Connection, RequestOptions};
use crate::error::Result;
use crate::transport::{HttpMethod, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// One advertised extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    /// Short identifier (e.g. `os-keypairs`)
    pub alias: String,
    /// Display name
    pub name: String,
    /// XML namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Last update timestamp, as reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtensionList {
    #[serde(default)]
    extensions: Vec<Extension>,
}

/// Extensions of one service, keyed by alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionCatalog {
    by_alias: HashMap<String, Extension>,
}

impl ExtensionCatalog {
    /// Create a catalog from a list of extensions.
    #[must_use]
    pub fn new(extensions: impl IntoIterator<Item = Extension>) -> Self {
        Self {
            by_alias: extensions
                .into_iter()
                .map(|extension| (extension.alias.clone(), extension))
                .collect(),
        }
    }

    /// Parse a `{"extensions": [...]}` response.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ResponseParse`] if the body is malformed.
    pub fn from_response(response: &Response) -> Result<Self> {
        let list: ExtensionList = response.json()?;
        Ok(Self::new(list.extensions))
    }

    /// Whether the alias is advertised.
    #[must_use]
    pub fn contains(&self, alias: &str) -> bool {
        self.by_alias.contains_key(alias)
    }

    /// Look up an extension by alias.
    #[must_use]
    pub fn get(&self, alias: &str) -> Option<&Extension> {
        self.by_alias.get(alias)
    }

    /// Advertised aliases, sorted.
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.by_alias.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }

    /// Number of extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_alias.len()
    }

    /// Whether no extension is advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_alias.is_empty()
    }
}

/// Fetch the extension list of the connection's service.
pub(crate) async fn discover(connection: &Connection) -> Result<ExtensionCatalog> {
    match connection
        .req(HttpMethod::Get, "/extensions", RequestOptions::new())
        .await
    {
        Ok(response) => {
            let catalog = ExtensionCatalog::from_response(&response)?;
            info!(count = catalog.len(), "discovered API extensions");
            Ok(catalog)
        }
        Err(err) if err.is_not_found() => {
            debug!("service exposes no extension list");
            Ok(ExtensionCatalog::default())
        }
        Err(err) => Err(err),
    }
}
