//! Region-keyed view of a service catalog.

use serde::Serialize;
use std::collections::HashMap;

/// One service exposed in a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    /// Catalog type string (e.g. `compute`)
    pub service_type: String,
    /// Endpoint version id, when the catalog reports one
    pub version: Option<String>,
}

/// Map of region to the services it exposes, in catalog order.
///
/// Endpoints without a region are recorded under the empty string. Entries are
/// never deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EndpointCatalog {
    regions: HashMap<String, Vec<CatalogEntry>>,
}

impl EndpointCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to a region.
    pub fn record(&mut self, region: Option<&str>, service_type: &str, version: Option<&str>) {
        self.regions
            .entry(region.unwrap_or_default().to_string())
            .or_default()
            .push(CatalogEntry {
                service_type: service_type.to_string(),
                version: version.map(str::to_string),
            });
    }

    /// Entries recorded for a region, in insertion order.
    #[must_use]
    pub fn entries(&self, region: &str) -> &[CatalogEntry] {
        self.regions.get(region).map(Vec::as_slice).unwrap_or_default()
    }

    /// Names of every region seen, sorted.
    #[must_use]
    pub fn regions(&self) -> Vec<&str> {
        let mut regions: Vec<&str> = self.regions.keys().map(String::as_str).collect();
        regions.sort_unstable();
        regions
    }

    /// Whether any region exposes the service type.
    #[must_use]
    pub fn has_service(&self, service_type: &str) -> bool {
        self.regions
            .values()
            .flatten()
            .any(|entry| entry.service_type == service_type)
    }

    /// Regions exposing the service type, sorted.
    #[must_use]
    pub fn regions_for(&self, service_type: &str) -> Vec<&str> {
        let mut regions: Vec<&str> = self
            .regions
            .iter()
            .filter(|(_, entries)| entries.iter().any(|e| e.service_type == service_type))
            .map(|(region, _)| region.as_str())
            .collect();
        regions.sort_unstable();
        regions
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.values().map(Vec::len).sum()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Extract a `major.minor` version from a URL path segment such as `/v1.1/`.
///
/// Returns the first match as a float; `None` if the URL carries no version.
#[must_use]
pub fn version_from_url(url: &str) -> Option<f64> {
    let mut rest = url;
    while let Some(index) = rest.find("/v") {
        let candidate = &rest[index + 2..];
        let major_len = candidate.bytes().take_while(u8::is_ascii_digit).count();
        if major_len > 0 && candidate[major_len..].starts_with('.') {
            let minor = &candidate[major_len + 1..];
            let minor_len = minor.bytes().take_while(u8::is_ascii_digit).count();
            if minor_len > 0 {
                let text = &candidate[..major_len + 1 + minor_len];
                if let Ok(version) = text.parse() {
                    return Some(version);
                }
            }
        }
        rest = candidate;
    }
    None
}
