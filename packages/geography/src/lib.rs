#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bidding zone to country mapping and border adjacency.
//!
//! Documents are published per bidding zone, but results are reported per
//! country. [`MarketConfig`] holds both directions of that mapping plus the
//! border adjacency used to build cross-border flow queries. It is
//! validated once at startup and read-only afterwards.

pub mod neighbors;
pub mod zones;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::neighbors::NeighborGraph;
use crate::zones::ZoneCountryMap;

/// Configuration shipped with the binary.
const EMBEDDED_CONFIG: &str = include_str!("../config/market.toml");

/// Errors raised while loading market configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or has the wrong shape.
    #[error("Invalid market config: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required mapping is missing or empty.
    #[error("Missing or empty {what}")]
    Empty { what: String },

    /// A country or zone code is malformed.
    #[error("Invalid code {code:?}: {reason}")]
    InvalidCode { code: String, reason: &'static str },
}

/// One zone or several.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ZoneList {
    One(String),
    Many(Vec<String>),
}

impl ZoneList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(zone) => vec![zone],
            Self::Many(zones) => zones,
        }
    }
}

/// On-disk shape of the configuration.
#[derive(Debug, Deserialize)]
struct RawMarketConfig {
    #[serde(default)]
    countries: BTreeMap<String, ZoneList>,
    #[serde(default)]
    zone_overrides: BTreeMap<String, String>,
    #[serde(default)]
    neighbors: BTreeMap<String, Vec<String>>,
}

/// Validated, immutable market configuration.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    zones: ZoneCountryMap,
    neighbors: NeighborGraph,
}

impl MarketConfig {
    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed, the country
    /// mapping is empty, or any code is malformed.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let raw: RawMarketConfig = toml::from_str(text)?;

        let countries = raw
            .countries
            .into_iter()
            .map(|(country, zones)| (country, zones.into_vec()))
            .collect();

        Ok(Self {
            zones: ZoneCountryMap::new(countries, &raw.zone_overrides)?,
            neighbors: NeighborGraph::new(&raw.neighbors)?,
        })
    }

    /// The configuration shipped with the binary.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the embedded file is invalid.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml(EMBEDDED_CONFIG)
    }

    /// Loads configuration from `path`, or the embedded default if `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Self::embedded();
        };

        log::info!("Loading market config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    #[must_use]
    pub const fn zones(&self) -> &ZoneCountryMap {
        &self.zones
    }

    #[must_use]
    pub const fn neighbors(&self) -> &NeighborGraph {
        &self.neighbors
    }
}

/// Trims and uppercases a code.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Normalizes and checks a two-letter country code.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidCode`] unless the code is two ASCII
/// letters.
pub fn normalize_country(code: &str) -> Result<String, ConfigError> {
    let normalized = normalize_code(code);
    if normalized.len() == 2 && normalized.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(normalized)
    } else {
        Err(ConfigError::InvalidCode {
            code: code.to_string(),
            reason: "country codes are two letters",
        })
    }
}

/// Normalizes and checks a zone code.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidCode`] if the code is empty or contains
/// characters other than letters, digits and `-`.
pub fn normalize_zone(code: &str) -> Result<String, ConfigError> {
    let normalized = normalize_code(code);
    if !normalized.is_empty()
        && normalized
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    {
        Ok(normalized)
    } else {
        Err(ConfigError::InvalidCode {
            code: code.to_string(),
            reason: "zone codes are letters, digits and '-'",
        })
    }
}
