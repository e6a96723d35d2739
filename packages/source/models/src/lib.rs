#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Document families and the canonical point format.
//!
//! Every document family (installed capacity, actual generation, forecast,
//! renewable generation, prices, physical flows) is parsed into
//! [`CanonicalPoint`] records. Each record knows its own [`DedupKey`], which
//! is what the downstream store upserts on.

use std::fmt;

use chrono::{DateTime, Datelike as _, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The kind of document a point was parsed from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentFamily {
    /// Installed generation capacity per production type.
    Capacity,
    /// Actual generation per production type.
    Generation,
    /// Day-ahead generation forecast.
    Forecast,
    /// Wind and solar generation.
    Renewable,
    /// Day-ahead and intraday prices.
    Prices,
    /// Cross-border physical flows.
    Flows,
}

/// How per-zone values are combined into per-country values.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AggregateOp {
    /// Sum of all non-null values.
    Sum,
    /// Unweighted arithmetic mean of all non-null values.
    Mean,
}

/// A directed pair of market zones (`source` → `dest`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZonePair {
    /// Zone the energy flows out of.
    pub source: String,
    /// Zone the energy flows into.
    pub dest: String,
}

impl ZonePair {
    #[must_use]
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }
}

impl fmt::Display for ZonePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.dest)
    }
}

/// A normalized, timestamped value produced by any document parser.
///
/// Fields that a family does not carry stay `None`. `value` is `None` when
/// the source point was blank or unparsable; it is never coerced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPoint {
    pub family: DocumentFamily,
    /// Absolute instant in UTC.
    pub timestamp_utc: DateTime<Utc>,
    /// Zone code, or a country code after aggregation.
    pub entity_id: String,
    /// Production type code (capacity/generation families only).
    pub category: Option<String>,
    pub category_label: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub currency: Option<String>,
    /// Resolution of the period the point came from, e.g. `PT60M`.
    pub resolution: Option<String>,
    pub contract_type: Option<String>,
    /// Flows only. Kept even when no country can be resolved for it.
    pub source_zone: Option<String>,
    /// Flows only.
    pub dest_zone: Option<String>,
    pub source_country: Option<String>,
    pub dest_country: Option<String>,
    /// Country the entity resolves to, when known.
    pub country: Option<String>,
    /// Capacity only: the year the capacity applies to.
    pub year: Option<i32>,
}

impl CanonicalPoint {
    /// Creates a point with only the always-present fields set.
    #[must_use]
    pub fn new(
        family: DocumentFamily,
        timestamp_utc: DateTime<Utc>,
        entity_id: impl Into<String>,
        value: Option<f64>,
    ) -> Self {
        Self {
            family,
            timestamp_utc,
            entity_id: entity_id.into(),
            category: None,
            category_label: None,
            value,
            unit: None,
            currency: None,
            resolution: None,
            contract_type: None,
            source_zone: None,
            dest_zone: None,
            source_country: None,
            dest_country: None,
            country: None,
            year: None,
        }
    }

    /// Returns the key the downstream store deduplicates this point on.
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        let category = self.category.clone().unwrap_or_default();

        match self.family {
            DocumentFamily::Capacity => DedupKey::Capacity {
                entity: self.entity_id.clone(),
                category,
                year: self.year.unwrap_or_else(|| self.timestamp_utc.year()),
            },
            DocumentFamily::Generation | DocumentFamily::Forecast | DocumentFamily::Renewable => {
                DedupKey::Series {
                    family: self.family,
                    entity: self.entity_id.clone(),
                    category,
                    timestamp: self.timestamp_utc,
                }
            }
            DocumentFamily::Prices => DedupKey::Price {
                entity: self.entity_id.clone(),
                contract_type: self.contract_type.clone().unwrap_or_default(),
                timestamp: self.timestamp_utc,
            },
            DocumentFamily::Flows => DedupKey::Flow {
                timestamp: self.timestamp_utc,
                source: self
                    .source_zone
                    .clone()
                    .or_else(|| self.source_country.clone())
                    .unwrap_or_else(|| self.entity_id.clone()),
                dest: self
                    .dest_zone
                    .clone()
                    .or_else(|| self.dest_country.clone())
                    .unwrap_or_default(),
            },
        }
    }
}

/// Identity of a point in the downstream store.
///
/// Two points with equal keys describe the same fact; the later one wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DedupKey {
    /// `(zone, category, year)`.
    Capacity {
        entity: String,
        category: String,
        year: i32,
    },
    /// `(zone-or-country, category, timestamp)` for generation, forecast
    /// and renewable points.
    Series {
        family: DocumentFamily,
        entity: String,
        category: String,
        timestamp: DateTime<Utc>,
    },
    /// `(zone-or-country, contract_type, timestamp)`.
    Price {
        entity: String,
        contract_type: String,
        timestamp: DateTime<Utc>,
    },
    /// `(timestamp, source, dest)`, by zone or, once aggregated, by country.
    Flow {
        timestamp: DateTime<Utc>,
        source: String,
        dest: String,
    },
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capacity {
                entity,
                category,
                year,
            } => write!(f, "capacity|{entity}|{category}|{year}"),
            Self::Series {
                family,
                entity,
                category,
                timestamp,
            } => write!(f, "{family}|{entity}|{category}|{}", timestamp.to_rfc3339()),
            Self::Price {
                entity,
                contract_type,
                timestamp,
            } => write!(f, "prices|{entity}|{contract_type}|{}", timestamp.to_rfc3339()),
            Self::Flow {
                timestamp,
                source,
                dest,
            } => write!(f, "flows|{}|{source}|{dest}", timestamp.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn capacity_key_uses_year_not_timestamp() {
        let mut a = CanonicalPoint::new(DocumentFamily::Capacity, ts(0), "10YBE----------2", None);
        a.category = Some("B16".to_string());
        a.year = Some(2025);
        let mut b = a.clone();
        b.timestamp_utc = ts(5);

        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key().to_string(), "capacity|10YBE----------2|B16|2025");
    }

    #[test]
    fn series_keys_differ_by_family() {
        let gen_point = CanonicalPoint::new(DocumentFamily::Generation, ts(1), "Z", Some(1.0));
        let mut fc_point = gen_point.clone();
        fc_point.family = DocumentFamily::Forecast;

        assert_ne!(gen_point.dedup_key(), fc_point.dedup_key());
    }

    #[test]
    fn flow_key_is_directional() {
        let mut ab = CanonicalPoint::new(DocumentFamily::Flows, ts(0), "A", Some(5.0));
        ab.source_zone = Some("A".to_string());
        ab.dest_zone = Some("B".to_string());
        let mut ba = ab.clone();
        ba.source_zone = Some("B".to_string());
        ba.dest_zone = Some("A".to_string());

        assert_ne!(ab.dedup_key(), ba.dedup_key());
    }

    #[test]
    fn family_round_trips_through_strings() {
        assert_eq!("prices".parse::<DocumentFamily>(), Ok(DocumentFamily::Prices));
        assert_eq!(DocumentFamily::Renewable.to_string(), "renewable");
        assert_eq!(AggregateOp::Mean.as_ref(), "mean");
    }
}
