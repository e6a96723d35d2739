//! Price documents.
//!
//! Contract type, currency and unit may be given on the document, on each
//! series, or on each period. The most specific one wins.

use entsoe_sync_market_models::contract_type_label;
use entsoe_sync_source_models::{CanonicalPoint, DocumentFamily};

use super::{DocumentParser, ParseContext, ParsedDocument, PeriodSpec, expand_period, sort_points};
use crate::ParseError;
use crate::family_def::PriceParserConfig;
use crate::xml::{Resolver, TIME_SERIES, check_in_band_error, parse_document};

pub struct PriceParser {
    config: PriceParserConfig,
}

impl PriceParser {
    #[must_use]
    pub const fn new(config: PriceParserConfig) -> Self {
        Self { config }
    }
}

/// Metadata inherited down the document → series → period chain.
#[derive(Clone, Copy)]
struct PriceMeta<'a> {
    contract: Option<&'a str>,
    currency: Option<&'a str>,
    unit: Option<&'a str>,
}

impl<'a> PriceMeta<'a> {
    fn read(
        r: &Resolver<'_>,
        node: roxmltree::Node<'a, '_>,
        config: &PriceParserConfig,
        parent: Self,
    ) -> Self {
        Self {
            contract: r.text_at(node, &config.contract_path).or(parent.contract),
            currency: r.text_at(node, &config.currency_path).or(parent.currency),
            unit: r.text_at(node, &config.unit_path).or(parent.unit),
        }
    }
}

impl DocumentParser for PriceParser {
    fn family(&self) -> DocumentFamily {
        DocumentFamily::Prices
    }

    fn parse(&self, text: &str, ctx: &ParseContext<'_>) -> Result<ParsedDocument, ParseError> {
        let doc = parse_document(text)?;
        check_in_band_error(&doc)?;

        let r = Resolver::for_document(&doc);
        let root = doc.root_element();
        let document_start = r.first_text(root, &self.config.document_start_paths);
        let document_resolution = r.text_at(root, "resolution");
        let none = PriceMeta {
            contract: None,
            currency: None,
            unit: None,
        };
        let document_meta = PriceMeta::read(&r, root, &self.config, none);

        let series = r.descendants(root, TIME_SERIES);
        let mut points = Vec::new();

        for ts in &series {
            let series_meta = PriceMeta::read(&r, *ts, &self.config, document_meta);
            let spec = PeriodSpec {
                value: &self.config.amount,
                inherited_resolution: r.text_at(*ts, "resolution").or(document_resolution),
                document_start,
                skip_missing: false,
            };

            for period in r.children(*ts, "Period") {
                let meta = PriceMeta::read(&r, period, &self.config, series_meta);
                let Some(expanded) = expand_period(&r, period, &spec)? else {
                    log::debug!("prices: skipping period without start");
                    continue;
                };

                points.extend(expanded.samples.into_iter().map(|sample| {
                    let mut point = CanonicalPoint::new(
                        DocumentFamily::Prices,
                        sample.timestamp,
                        ctx.zone(),
                        sample.value,
                    );
                    point.contract_type = meta.contract.map(str::to_string);
                    point.category_label =
                        meta.contract.map(|c| contract_type_label(c).to_string());
                    point.currency = meta.currency.map(str::to_string);
                    point.unit = meta.unit.map(str::to_string);
                    point.resolution = Some(expanded.resolution.clone());
                    point
                }));
            }
        }

        sort_points(&mut points);

        Ok(ParsedDocument {
            points,
            series_count: series.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family_def::Target;
    use crate::parser::for_definition;
    use crate::registry::family;

    fn parse(xml: &str) -> Result<ParsedDocument, ParseError> {
        let target = Target::Zone("10YNL----------L".to_string());
        for_definition(&family(DocumentFamily::Prices)).parse(xml, &ParseContext::new(&target))
    }

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Publication_MarketDocument xmlns="urn:iec62325.351:tc57wg16:451-3:publicationdocument:7:3">
  <period.timeInterval><start>2025-01-01T00:00Z</start><end>2025-01-01T02:00Z</end></period.timeInterval>
  <contract_MarketAgreement.type>A01</contract_MarketAgreement.type>
  <TimeSeries>
    <currency_Unit.name>EUR</currency_Unit.name>
    <price_Measure_Unit.name>MWH</price_Measure_Unit.name>
    <Period>
      <resolution>PT60M</resolution>
      <Point><position>1</position><price.amount>85.10</price.amount></Point>
      <Point><position>2</position><price.amount>90.25</price.amount></Point>
    </Period>
  </TimeSeries>
  <TimeSeries>
    <contract_MarketAgreement.type>A01</contract_MarketAgreement.type>
    <currency_Unit.name>EUR</currency_Unit.name>
    <price_Measure_Unit.name>MWH</price_Measure_Unit.name>
    <Period>
      <timeInterval><start>2025-01-01T00:00Z</start><end>2025-01-01T01:00Z</end></timeInterval>
      <resolution>PT15M</resolution>
      <contract_MarketAgreement.type>A07</contract_MarketAgreement.type>
      <Point><position>1</position><price.amount>-3.5</price.amount></Point>
    </Period>
  </TimeSeries>
</Publication_MarketDocument>"#;

    #[test]
    fn metadata_falls_back_period_series_document() {
        let parsed = parse(DOC).unwrap();

        assert_eq!(parsed.series_count, 2);
        assert_eq!(parsed.points.len(), 3);

        let intraday = parsed
            .points
            .iter()
            .find(|p| p.contract_type.as_deref() == Some("A07"))
            .unwrap();
        assert_eq!(intraday.value, Some(-3.5));
        assert_eq!(intraday.category_label.as_deref(), Some("Intraday"));
        assert_eq!(intraday.resolution.as_deref(), Some("PT15M"));

        let day_ahead: Vec<_> = parsed
            .points
            .iter()
            .filter(|p| p.contract_type.as_deref() == Some("A01"))
            .collect();
        assert_eq!(day_ahead.len(), 2);
        assert_eq!(day_ahead[1].value, Some(90.25));
        assert_eq!(day_ahead[1].timestamp_utc.format("%H:%M").to_string(), "01:00");

        for p in &parsed.points {
            assert_eq!(p.currency.as_deref(), Some("EUR"));
            assert_eq!(p.unit.as_deref(), Some("MWH"));
            assert_eq!(p.entity_id, "10YNL----------L");
            assert_eq!(p.category, None);
        }
    }

    #[test]
    fn points_sorted_by_timestamp() {
        let parsed = parse(DOC).unwrap();
        let mut sorted = parsed.points.clone();
        sorted.sort_by_key(|p| p.timestamp_utc);
        assert_eq!(parsed.points, sorted);
    }

    #[test]
    fn surfaces_in_band_error() {
        let xml = r#"<Acknowledgement_MarketDocument xmlns="urn:iec62325.351:tc57wg16:451-1:acknowledgementdocument:7:0">
  <Reason><code>B11</code><text>Requested window exceeds limit</text></Reason>
</Acknowledgement_MarketDocument>"#;

        assert_eq!(
            parse(xml).unwrap_err(),
            ParseError::InBand {
                code: "B11".to_string(),
                text: "Requested window exceeds limit".to_string(),
            }
        );
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(matches!(
            parse("<Publication_MarketDocument>"),
            Err(ParseError::Malformed(_))
        ));
    }
}
