//! Zone ↔ country lookup.

use std::collections::{BTreeMap, HashMap};

use entsoe_sync_source::ValidationError;

use crate::{ConfigError, normalize_code, normalize_country, normalize_zone};

/// Selection keyword meaning "every configured country".
pub const ALL_COUNTRIES: &str = "ALL";

/// Bidirectional lookup between bidding zones and countries.
///
/// A country maps to one or more zones; a zone maps to at most one
/// country. When a zone is listed under several countries the last one
/// (in country code order) wins and a warning is logged. Explicit
/// overrides are applied on top of that.
#[derive(Debug, Clone)]
pub struct ZoneCountryMap {
    country_zones: BTreeMap<String, Vec<String>>,
    zone_country: HashMap<String, String>,
}

impl ZoneCountryMap {
    /// Builds the map from a country → zones mapping and zone → country
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Empty`] if no country is configured or a
    /// country has no zones, and [`ConfigError::InvalidCode`] for malformed
    /// codes.
    pub fn new(
        countries: BTreeMap<String, Vec<String>>,
        overrides: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        if countries.is_empty() {
            return Err(ConfigError::Empty {
                what: "country to zone mapping".to_string(),
            });
        }

        let mut country_zones: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (country, zones) in countries {
            let country = normalize_country(&country)?;
            let entry = country_zones.entry(country.clone()).or_default();
            for zone in zones {
                let zone = normalize_zone(&zone)?;
                if !entry.contains(&zone) {
                    entry.push(zone);
                }
            }
            if entry.is_empty() {
                return Err(ConfigError::Empty {
                    what: format!("zone list for {country}"),
                });
            }
        }

        let mut zone_country: HashMap<String, String> = HashMap::new();
        for (country, zones) in &country_zones {
            for zone in zones {
                if let Some(previous) = zone_country.insert(zone.clone(), country.clone()) {
                    log::warn!("Zone {zone} is listed for {previous} and {country}; using {country}");
                }
            }
        }

        for (zone, country) in overrides {
            zone_country.insert(normalize_zone(zone)?, normalize_country(country)?);
        }

        Ok(Self {
            country_zones,
            zone_country,
        })
    }

    /// Country of `zone`, or `None` if the zone is unmapped.
    #[must_use]
    pub fn zone_to_country(&self, zone: &str) -> Option<&str> {
        self.zone_country
            .get(&normalize_code(zone))
            .map(String::as_str)
    }

    /// Zones of `country`, or an empty slice if the country is unknown.
    #[must_use]
    pub fn country_to_zones(&self, country: &str) -> &[String] {
        self.country_zones
            .get(&normalize_code(country))
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn has_country(&self, country: &str) -> bool {
        self.country_zones.contains_key(&normalize_code(country))
    }

    /// Configured countries in code order.
    pub fn countries(&self) -> impl Iterator<Item = &str> {
        self.country_zones.keys().map(String::as_str)
    }

    /// Resolves a user selection: `ALL` or a comma-separated list of
    /// country codes. Order is preserved and duplicates are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownCountry`] for the first code that
    /// is not configured, and [`ValidationError::InvalidFilter`] for an
    /// empty selection.
    pub fn select(&self, selection: &str) -> Result<Vec<String>, ValidationError> {
        if normalize_code(selection) == ALL_COUNTRIES {
            return Ok(self.countries().map(str::to_string).collect());
        }

        let mut selected: Vec<String> = Vec::new();
        for code in selection.split(',').map(normalize_code) {
            if code.is_empty() {
                continue;
            }
            if !self.has_country(&code) {
                return Err(ValidationError::UnknownCountry {
                    code,
                    known: self.countries().map(str::to_string).collect(),
                });
            }
            if !selected.contains(&code) {
                selected.push(code);
            }
        }

        if selected.is_empty() {
            return Err(ValidationError::InvalidFilter {
                message: "no country selected".to_string(),
            });
        }

        Ok(selected)
    }
}
