//! Output sinks.
//!
//! Every record carries its deduplication key so a downstream store can
//! upsert on it. Writing the same key twice describes the same fact.

use std::io::Write;

use chrono::{DateTime, Utc};
use entsoe_sync_source_models::{CanonicalPoint, DocumentFamily};
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::SyncError;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed JSON array.
    #[default]
    Json,
    /// CSV with a header row.
    Csv,
}

/// Flat, serializable view of a [`CanonicalPoint`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointRecord<'a> {
    pub dedup_key: String,
    pub family: DocumentFamily,
    pub timestamp_utc: DateTime<Utc>,
    pub entity_id: &'a str,
    pub country: Option<&'a str>,
    pub category: Option<&'a str>,
    pub category_label: Option<&'a str>,
    pub value: Option<f64>,
    pub unit: Option<&'a str>,
    pub currency: Option<&'a str>,
    pub resolution: Option<&'a str>,
    pub contract_type: Option<&'a str>,
    pub source_zone: Option<&'a str>,
    pub dest_zone: Option<&'a str>,
    pub source_country: Option<&'a str>,
    pub dest_country: Option<&'a str>,
    pub year: Option<i32>,
}

impl<'a> From<&'a CanonicalPoint> for PointRecord<'a> {
    fn from(p: &'a CanonicalPoint) -> Self {
        Self {
            dedup_key: p.dedup_key().to_string(),
            family: p.family,
            timestamp_utc: p.timestamp_utc,
            entity_id: &p.entity_id,
            country: p.country.as_deref(),
            category: p.category.as_deref(),
            category_label: p.category_label.as_deref(),
            value: p.value,
            unit: p.unit.as_deref(),
            currency: p.currency.as_deref(),
            resolution: p.resolution.as_deref(),
            contract_type: p.contract_type.as_deref(),
            source_zone: p.source_zone.as_deref(),
            dest_zone: p.dest_zone.as_deref(),
            source_country: p.source_country.as_deref(),
            dest_country: p.dest_country.as_deref(),
            year: p.year,
        }
    }
}

/// Receives the points a job produced.
pub trait PointSink {
    /// Writes `points` in order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if the underlying writer fails.
    fn write_points(&mut self, points: &[CanonicalPoint]) -> Result<(), SyncError>;
}

pub struct JsonSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> PointSink for JsonSink<W> {
    fn write_points(&mut self, points: &[CanonicalPoint]) -> Result<(), SyncError> {
        let records: Vec<PointRecord<'_>> = points.iter().map(PointRecord::from).collect();
        serde_json::to_writer_pretty(&mut self.writer, &records)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
        }
    }
}

impl<W: Write> PointSink for CsvSink<W> {
    fn write_points(&mut self, points: &[CanonicalPoint]) -> Result<(), SyncError> {
        for point in points {
            self.writer.serialize(PointRecord::from(point))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Builds the sink for `format` over `writer`.
pub fn sink_for<'w, W: Write + 'w>(format: OutputFormat, writer: W) -> Box<dyn PointSink + 'w> {
    match format {
        OutputFormat::Json => Box::new(JsonSink::new(writer)),
        OutputFormat::Csv => Box::new(CsvSink::new(writer)),
    }
}
