#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fixed code tables published by the transparency platform.
//!
//! Production-type (PSR) codes and contract-type codes are stable,
//! platform-defined identifiers. Documents only ever carry the code; these
//! tables resolve them to human-readable labels. Codes that are not in the
//! table resolve to themselves so that newly introduced codes still show
//! up in the output instead of being dropped.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Category code used for forecast series that carry no production type.
///
/// Some countries only publish an aggregate total; those series land in
/// this synthetic bucket rather than being discarded.
pub const AGGREGATE_CATEGORY: &str = "ALL";

/// Label for [`AGGREGATE_CATEGORY`].
pub const AGGREGATE_CATEGORY_LABEL: &str = "All production types";

/// Production type code → label.
///
/// Extend this table whenever the platform adds new PSR codes.
pub const PRODUCTION_TYPES: &[(&str, &str)] = &[
    ("B01", "Biomass"),
    ("B02", "Fossil Brown coal/Lignite"),
    ("B03", "Fossil Coal-derived gas"),
    ("B04", "Fossil Gas"),
    ("B05", "Fossil Hard coal"),
    ("B06", "Fossil Oil"),
    ("B07", "Fossil Oil shale"),
    ("B08", "Fossil Peat"),
    ("B09", "Geothermal"),
    ("B10", "Hydro Pumped Storage"),
    ("B11", "Hydro Run-of-river and pondage"),
    ("B12", "Hydro Water Reservoir"),
    ("B13", "Marine"),
    ("B14", "Nuclear"),
    ("B15", "Other renewable"),
    ("B16", "Solar"),
    ("B17", "Waste"),
    ("B18", "Wind Offshore"),
    ("B19", "Wind Onshore"),
    ("B20", "Other"),
    (AGGREGATE_CATEGORY, AGGREGATE_CATEGORY_LABEL),
];

/// Production types requested by default for renewable generation
/// (solar, wind offshore, wind onshore).
pub const DEFAULT_RENEWABLE_TYPES: &[&str] = &["B16", "B18", "B19"];

/// Resolves a production type code to its label.
///
/// Unknown codes pass through unchanged (e.g. `"B25"` → `"B25"`).
#[must_use]
pub fn production_type_label(code: &str) -> &str {
    PRODUCTION_TYPES
        .iter()
        .find(|(c, _)| *c == code)
        .map_or(code, |(_, label)| label)
}

/// Market agreement (contract) type of a price document.
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
pub enum ContractType {
    /// Day-ahead auction results.
    #[serde(rename = "A01")]
    #[strum(serialize = "A01")]
    DayAhead,
    /// Continuous intraday trading.
    #[serde(rename = "A07")]
    #[strum(serialize = "A07")]
    Intraday,
}

impl ContractType {
    /// Returns the platform code (e.g. `"A01"`).
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::DayAhead => "A01",
            Self::Intraday => "A07",
        }
    }

    /// Returns the human-readable label (e.g. `"Day-ahead"`).
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::DayAhead => "Day-ahead",
            Self::Intraday => "Intraday",
        }
    }
}

/// Resolves a contract type code to its label, passing unknown codes
/// through unchanged.
#[must_use]
pub fn contract_type_label(code: &str) -> &str {
    code.parse::<ContractType>().map_or(code, |c| c.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_production_types() {
        assert_eq!(production_type_label("B16"), "Solar");
        assert_eq!(production_type_label("B14"), "Nuclear");
        assert_eq!(production_type_label("B19"), "Wind Onshore");
        assert_eq!(
            production_type_label(AGGREGATE_CATEGORY),
            AGGREGATE_CATEGORY_LABEL
        );
    }

    #[test]
    fn unknown_production_type_passes_through() {
        assert_eq!(production_type_label("B25"), "B25");
    }

    #[test]
    fn parses_contract_type_codes() {
        assert_eq!("A01".parse::<ContractType>(), Ok(ContractType::DayAhead));
        assert_eq!("A07".parse::<ContractType>(), Ok(ContractType::Intraday));
        assert!("A99".parse::<ContractType>().is_err());
        assert_eq!(ContractType::Intraday.to_string(), "A07");
    }

    #[test]
    fn contract_labels() {
        assert_eq!(contract_type_label("A01"), "Day-ahead");
        assert_eq!(contract_type_label("A99"), "A99");
    }
}
