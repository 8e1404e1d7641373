use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One relay server to probe. Location fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub hostname: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    /// IP literal or resolvable host name. Falls back to `hostname` when absent.
    #[serde(default)]
    pub address: String,
}

impl Endpoint {
    pub fn new(
        hostname: impl Into<String>,
        country: impl Into<String>,
        city: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            country: country.into(),
            city: city.into(),
            address: address.into(),
        }
    }

    pub fn target(&self) -> &str {
        if self.address.is_empty() {
            &self.hostname
        } else {
            &self.address
        }
    }
}

/// Reads a cached endpoint list (a JSON array of endpoints).
pub fn load_endpoints(path: &Path) -> Result<Vec<Endpoint>, ConfigError> {
    let content = fs::read_to_string(path)?;
    let endpoints = serde_json::from_str::<Vec<Endpoint>>(&content)?;
    Ok(endpoints)
}

/// Keeps endpoints whose country matches `country`, ignoring case.
pub fn filter_by_country(endpoints: Vec<Endpoint>, country: &str) -> Vec<Endpoint> {
    endpoints
        .into_iter()
        .filter(|e| e.country.eq_ignore_ascii_case(country))
        .collect()
}
