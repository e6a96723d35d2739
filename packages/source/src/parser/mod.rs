//! Document parsers.
//!
//! Every family's XML follows the same skeleton: a document holds
//! `TimeSeries` blocks, each series holds `Period` blocks, and each period
//! holds `Point`s addressed by a 1-based `position`. The point at position
//! `p` occurs at `period_start + (p - 1) × resolution`. [`expand_period`]
//! implements that expansion once; the family parsers only decide which
//! metadata to attach to each point.

mod flow;
mod price;
mod production;

use chrono::{DateTime, Duration, Utc};
use entsoe_sync_source_models::{CanonicalPoint, DocumentFamily, ZonePair};
use roxmltree::Node;

pub use flow::FlowParser;
pub use price::PriceParser;
pub use production::ProductionParser;

use crate::ParseError;
use crate::duration::{DEFAULT_STEP_MINUTES, resolve_step};
use crate::family_def::{FamilyDefinition, ParserConfig, Target};
use crate::window::parse_instant;
use crate::xml::Resolver;

/// What the document was requested for.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub target: &'a Target,
}

impl<'a> ParseContext<'a> {
    #[must_use]
    pub const fn new(target: &'a Target) -> Self {
        Self { target }
    }

    /// The queried zone, or the source zone of a queried pair.
    #[must_use]
    pub fn zone(&self) -> &'a str {
        match self.target {
            Target::Zone(zone) => zone,
            Target::Pair(pair) => &pair.source,
        }
    }

    #[must_use]
    pub const fn pair(&self) -> Option<&'a ZonePair> {
        match self.target {
            Target::Zone(_) => None,
            Target::Pair(pair) => Some(pair),
        }
    }
}

/// Result of parsing one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    /// Points ordered by `(timestamp, category)`.
    pub points: Vec<CanonicalPoint>,
    /// Number of `TimeSeries` blocks in the document; this is the unit
    /// the platform paginates over.
    pub series_count: usize,
}

/// Turns raw document text into canonical points.
pub trait DocumentParser: Send + Sync {
    fn family(&self) -> DocumentFamily;

    /// Parses `text`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the document is malformed, carries an
    /// in-band platform error, or contains an invalid timestamp, position
    /// or resolution.
    fn parse(&self, text: &str, ctx: &ParseContext<'_>) -> Result<ParsedDocument, ParseError>;
}

/// Builds the parser a family definition asks for.
#[must_use]
pub fn for_definition(def: &FamilyDefinition) -> Box<dyn DocumentParser> {
    match &def.parser {
        ParserConfig::Production(config) => {
            Box::new(ProductionParser::new(def.family, config.clone()))
        }
        ParserConfig::Price(config) => Box::new(PriceParser::new(config.clone())),
        ParserConfig::Flow(config) => Box::new(FlowParser::new(config.clone())),
    }
}

/// One point of an expanded period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

/// An expanded `Period` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedPeriod {
    /// Resolution as written in the document, or `PT{n}M` for the fallback.
    pub resolution: String,
    pub samples: Vec<Sample>,
}

/// Element names and fallbacks used to expand a period.
#[derive(Debug, Clone, Copy)]
pub struct PeriodSpec<'a> {
    /// Element holding each point's value.
    pub value: &'a str,
    /// Resolution of the enclosing series or document.
    pub inherited_resolution: Option<&'a str>,
    /// Document-level start, used when the period has none.
    pub document_start: Option<&'a str>,
    /// Skip points whose value is absent or unparsable.
    pub skip_missing: bool,
}

/// Expands a `Period` into absolute timestamps.
///
/// Returns `Ok(None)` if neither the period nor the document carries a
/// start instant; such periods cannot be placed in time and are skipped.
///
/// # Errors
///
/// Returns [`ParseError`] for an unparsable start, a malformed resolution,
/// or a position that is not a positive integer.
pub fn expand_period(
    resolver: &Resolver<'_>,
    period: Node<'_, '_>,
    spec: &PeriodSpec<'_>,
) -> Result<Option<ExpandedPeriod>, ParseError> {
    let Some(start_text) = resolver
        .text_at(period, "timeInterval/start")
        .or(spec.document_start)
    else {
        return Ok(None);
    };
    let start = parse_instant(start_text).ok_or_else(|| ParseError::InvalidTimestamp {
        value: start_text.to_string(),
    })?;

    let raw_resolution = resolver
        .text_at(period, "resolution")
        .or(spec.inherited_resolution);
    let step = resolve_step(raw_resolution, DEFAULT_STEP_MINUTES)?;
    let resolution = raw_resolution.map_or_else(|| format!("PT{step}M"), str::to_string);

    let mut samples = Vec::new();
    for point in resolver.children(period, "Point") {
        let position = parse_position(resolver.text_at(point, "position"))?;
        let value = resolver.text_at(point, spec.value).and_then(parse_value);

        if value.is_none() && spec.skip_missing {
            continue;
        }

        let timestamp = i64::from(step)
            .checked_mul(i64::from(position) - 1)
            .and_then(Duration::try_minutes)
            .and_then(|offset| start.checked_add_signed(offset))
            .ok_or_else(|| ParseError::InvalidPosition {
                value: position.to_string(),
            })?;
        samples.push(Sample { timestamp, value });
    }

    Ok(Some(ExpandedPeriod {
        resolution,
        samples,
    }))
}

/// A missing position means the first one.
fn parse_position(text: Option<&str>) -> Result<u32, ParseError> {
    let Some(text) = text else {
        return Ok(1);
    };
    match text.parse::<u32>() {
        Ok(position) if position > 0 => Ok(position),
        _ => Err(ParseError::InvalidPosition {
            value: text.to_string(),
        }),
    }
}

/// Blank or unparsable values become `None`, never zero.
fn parse_value(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Sorts points by `(timestamp, category)`, breaking ties on the zone
/// fields so the order is fully deterministic.
pub fn sort_points(points: &mut [CanonicalPoint]) {
    points.sort_by(|a, b| {
        a.timestamp_utc
            .cmp(&b.timestamp_utc)
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
            .then_with(|| a.source_zone.cmp(&b.source_zone))
            .then_with(|| a.dest_zone.cmp(&b.dest_zone))
            .then_with(|| a.contract_type.cmp(&b.contract_type))
            .then_with(|| a.dest_country.cmp(&b.dest_country))
    });
}
