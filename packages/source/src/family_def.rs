//! Config-driven document family definition.
//!
//! [`FamilyDefinition`] captures everything that differs between document
//! families: request codes, how zones are bound to query parameters, the
//! platform's window limits, which element names the parser reads, and
//! how per-zone values combine into per-country values. A single generic
//! pipeline handles all families.

use entsoe_sync_market_models::ContractType;
use entsoe_sync_source_models::{AggregateOp, DocumentFamily, ZonePair};
use serde::Deserialize;

use crate::ValidationError;
use crate::window::SubWindow;

// ── Top-level family definition ──────────────────────────────────────────

/// A complete, config-driven document family definition.
///
/// Loaded from TOML files at compile time.
#[derive(Debug, Clone, Deserialize)]
pub struct FamilyDefinition {
    /// Which family this definition describes.
    pub family: DocumentFamily,
    /// Human-readable name (e.g. `"Installed capacity per production type"`).
    pub name: String,
    /// `documentType` code (e.g. `"A68"`).
    pub document_type: String,
    /// `processType` code, for families that require one.
    #[serde(default)]
    pub process_type: Option<String>,
    /// How per-zone values are combined per country.
    pub aggregate: AggregateOp,
    /// How the queried zone(s) map to request parameters.
    pub domain: DomainBinding,
    /// Request parameter filtering by production type, if supported.
    #[serde(default)]
    pub psr_param: Option<String>,
    /// Request parameter selecting the contract type, if supported.
    #[serde(default)]
    pub contract_param: Option<String>,
    pub window: WindowLimits,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    pub parser: ParserConfig,
}

// ── Request shape ────────────────────────────────────────────────────────

/// How the queried zone(s) are placed into request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "binding", rename_all = "snake_case")]
pub enum DomainBinding {
    /// One zone under one parameter (e.g. `in_Domain`).
    Single { param: String },
    /// One zone repeated under several parameters (e.g. `in_Domain` and
    /// `out_Domain` for prices).
    Same { params: Vec<String> },
    /// A directed zone pair.
    Pair {
        source_param: String,
        dest_param: String,
    },
}

impl DomainBinding {
    #[must_use]
    pub const fn is_pair(&self) -> bool {
        matches!(self, Self::Pair { .. })
    }
}

/// What a single request is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Zone(String),
    Pair(ZonePair),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zone(zone) => f.write_str(zone),
            Self::Pair(pair) => write!(f, "{pair}"),
        }
    }
}

/// Optional request filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilters {
    /// Production type code (e.g. `"B16"`).
    pub psr_type: Option<String>,
    pub contract_type: Option<ContractType>,
}

/// Platform limits on a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WindowLimits {
    /// Longest span a single request may cover.
    pub max_span_days: u32,
    /// Both bounds are floored to this granularity before planning.
    pub mtu_minutes: u32,
}

/// Offset-based pagination settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    /// Request parameter carrying the offset.
    #[serde(default = "default_offset_param")]
    pub param: String,
    /// Records per page; a shorter page is the last one.
    pub page_size: u32,
    /// Highest offset the platform accepts.
    pub max_offset: u32,
}

fn default_offset_param() -> String {
    "offset".to_string()
}

// ── Parser configuration ─────────────────────────────────────────────────

/// Which parser strategy a family uses, and the element names it reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParserConfig {
    /// Quantities per production type.
    Production(ProductionParserConfig),
    /// Prices with contract/currency/unit metadata.
    Price(PriceParserConfig),
    /// Directed cross-border quantities.
    Flow(FlowParserConfig),
}

/// What to do with a series that carries no production type code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCategory {
    /// Keep the series with no category.
    #[default]
    Keep,
    /// Put the series in the synthetic `ALL` bucket.
    Aggregate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductionParserConfig {
    /// Element holding a point's value.
    #[serde(default = "default_quantity")]
    pub quantity: String,
    /// Series path holding the production type code.
    #[serde(default = "default_psr_path")]
    pub psr_path: String,
    #[serde(default)]
    pub missing_category: MissingCategory,
    /// Skip points whose quantity element is absent instead of emitting a
    /// null value.
    #[serde(default)]
    pub skip_missing_values: bool,
    /// Series paths whose zone code replaces the queried zone.
    #[serde(default)]
    pub zone_paths: Vec<String>,
    /// Series paths holding the unit of measure.
    #[serde(default)]
    pub unit_paths: Vec<String>,
    /// Document paths used when a period has no start.
    #[serde(default)]
    pub document_start_paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceParserConfig {
    #[serde(default = "default_price_amount")]
    pub amount: String,
    pub contract_path: String,
    pub currency_path: String,
    pub unit_path: String,
    #[serde(default)]
    pub document_start_paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowParserConfig {
    #[serde(default = "default_quantity")]
    pub quantity: String,
    /// Candidate `[source, dest]` element pairs, tried in order.
    pub pair_paths: Vec<[String; 2]>,
    #[serde(default)]
    pub unit_paths: Vec<String>,
    #[serde(default)]
    pub document_start_paths: Vec<String>,
}

fn default_quantity() -> String {
    "quantity".to_string()
}

fn default_psr_path() -> String {
    "MktPSRType/psrType".to_string()
}

fn default_price_amount() -> String {
    "price.amount".to_string()
}

// ── Query construction ───────────────────────────────────────────────────

impl FamilyDefinition {
    /// Builds the request parameters for one sub-window (and page).
    ///
    /// The access token is not included; the fetcher adds it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidFilter`] if the target shape does
    /// not match the family's domain binding, or if a filter is supplied
    /// that the family does not support or that is malformed.
    pub fn query_params(
        &self,
        target: &Target,
        window: &SubWindow,
        filters: &QueryFilters,
        offset: Option<u32>,
    ) -> Result<Vec<(String, String)>, ValidationError> {
        let invalid = |message: String| ValidationError::InvalidFilter { message };

        let mut params = vec![("documentType".to_string(), self.document_type.clone())];
        if let Some(process_type) = &self.process_type {
            params.push(("processType".to_string(), process_type.clone()));
        }

        match (&self.domain, target) {
            (DomainBinding::Single { param }, Target::Zone(zone)) => {
                params.push((param.clone(), zone.clone()));
            }
            (DomainBinding::Same { params: names }, Target::Zone(zone)) => {
                params.extend(names.iter().map(|n| (n.clone(), zone.clone())));
            }
            (
                DomainBinding::Pair {
                    source_param,
                    dest_param,
                },
                Target::Pair(pair),
            ) => {
                params.push((dest_param.clone(), pair.dest.clone()));
                params.push((source_param.clone(), pair.source.clone()));
            }
            (binding, target) => {
                return Err(invalid(format!(
                    "{} expects a {} target, got {target}",
                    self.family,
                    if binding.is_pair() { "zone pair" } else { "zone" },
                )));
            }
        }

        if let Some(contract) = filters.contract_type {
            let Some(param) = &self.contract_param else {
                return Err(invalid(format!(
                    "{} does not support a contract type filter",
                    self.family
                )));
            };
            params.push((param.clone(), contract.code().to_string()));
        }

        if let Some(psr_type) = &filters.psr_type {
            let Some(param) = &self.psr_param else {
                return Err(invalid(format!(
                    "{} does not support a production type filter",
                    self.family
                )));
            };
            validate_psr_code(psr_type)?;
            params.push((param.clone(), psr_type.clone()));
        }

        params.push(("periodStart".to_string(), window.compact_start()));
        params.push(("periodEnd".to_string(), window.compact_end()));

        if let (Some(pagination), Some(offset)) = (&self.pagination, offset) {
            params.push((pagination.param.clone(), offset.to_string()));
        }

        Ok(params)
    }
}

/// Checks that `code` looks like a production type code (`B` + 2 digits).
///
/// # Errors
///
/// Returns [`ValidationError::InvalidFilter`] otherwise.
pub fn validate_psr_code(code: &str) -> Result<(), ValidationError> {
    let bytes = code.as_bytes();
    if bytes.len() == 3 && bytes[0] == b'B' && bytes[1..].iter().all(u8::is_ascii_digit) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFilter {
            message: format!("invalid production type code {code:?}"),
        })
    }
}

/// Parses a family definition from TOML text.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or missing required fields.
pub fn parse_family_toml(toml_str: &str) -> Result<FamilyDefinition, toml::de::Error> {
    toml::from_str(toml_str)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};

    use super::*;
    use crate::registry::family;

    fn window() -> SubWindow {
        SubWindow {
            start: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    fn get<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn generation_query_with_psr_filter() {
        let def = family(DocumentFamily::Generation);
        let filters = QueryFilters {
            psr_type: Some("B16".to_string()),
            ..QueryFilters::default()
        };
        let params = def
            .query_params(&Target::Zone("10YBE----------2".to_string()), &window(), &filters, None)
            .unwrap();

        assert_eq!(get(&params, "documentType"), Some("A75"));
        assert_eq!(get(&params, "processType"), Some("A16"));
        assert_eq!(get(&params, "in_Domain"), Some("10YBE----------2"));
        assert_eq!(get(&params, "psrType"), Some("B16"));
        assert_eq!(get(&params, "periodStart"), Some("202501010000"));
        assert_eq!(get(&params, "periodEnd"), Some("202501020000"));
    }

    #[test]
    fn price_query_binds_zone_twice_with_offset() {
        let def = family(DocumentFamily::Prices);
        let filters = QueryFilters {
            contract_type: Some(ContractType::DayAhead),
            ..QueryFilters::default()
        };
        let params = def
            .query_params(&Target::Zone("Z".to_string()), &window(), &filters, Some(100))
            .unwrap();

        assert_eq!(get(&params, "in_Domain"), Some("Z"));
        assert_eq!(get(&params, "out_Domain"), Some("Z"));
        assert_eq!(get(&params, "contract_MarketAgreement.type"), Some("A01"));
        assert_eq!(get(&params, "offset"), Some("100"));
    }

    #[test]
    fn flow_query_binds_dest_to_in_domain() {
        let def = family(DocumentFamily::Flows);
        let params = def
            .query_params(
                &Target::Pair(ZonePair::new("SRC", "DST")),
                &window(),
                &QueryFilters::default(),
                None,
            )
            .unwrap();

        assert_eq!(get(&params, "in_Domain"), Some("DST"));
        assert_eq!(get(&params, "out_Domain"), Some("SRC"));
    }

    #[test]
    fn rejects_mismatched_target_and_filters() {
        let flows = family(DocumentFamily::Flows);
        assert!(
            flows
                .query_params(&Target::Zone("Z".to_string()), &window(), &QueryFilters::default(), None)
                .is_err()
        );

        let prices = family(DocumentFamily::Prices);
        let psr = QueryFilters {
            psr_type: Some("B16".to_string()),
            ..QueryFilters::default()
        };
        assert!(
            prices
                .query_params(&Target::Zone("Z".to_string()), &window(), &psr, None)
                .is_err()
        );

        let capacity = family(DocumentFamily::Capacity);
        let bad = QueryFilters {
            psr_type: Some("solar".to_string()),
            ..QueryFilters::default()
        };
        assert!(
            capacity
                .query_params(&Target::Zone("Z".to_string()), &window(), &bad, None)
                .is_err()
        );
    }
}
