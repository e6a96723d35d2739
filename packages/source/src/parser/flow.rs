//! Cross-border physical flow documents.

use entsoe_sync_source_models::{CanonicalPoint, DocumentFamily};

use super::{DocumentParser, ParseContext, ParsedDocument, PeriodSpec, expand_period, sort_points};
use crate::ParseError;
use crate::family_def::FlowParserConfig;
use crate::xml::{Resolver, TIME_SERIES, check_in_band_error, parse_document};

pub struct FlowParser {
    config: FlowParserConfig,
}

impl FlowParser {
    #[must_use]
    pub const fn new(config: FlowParserConfig) -> Self {
        Self { config }
    }
}

impl DocumentParser for FlowParser {
    fn family(&self) -> DocumentFamily {
        DocumentFamily::Flows
    }

    fn parse(&self, text: &str, ctx: &ParseContext<'_>) -> Result<ParsedDocument, ParseError> {
        let doc = parse_document(text)?;
        check_in_band_error(&doc)?;

        let r = Resolver::for_document(&doc);
        let root = doc.root_element();
        let document_start = r.first_text(root, &self.config.document_start_paths);
        let document_resolution = r.text_at(root, "resolution");

        let series = r.descendants(root, TIME_SERIES);
        let mut points = Vec::new();

        for ts in &series {
            let declared = self
                .config
                .pair_paths
                .iter()
                .find_map(|[source, dest]| Some((r.text_at(*ts, source)?, r.text_at(*ts, dest)?)));
            let queried = ctx
                .pair()
                .map(|p| (p.source.as_str(), p.dest.as_str()));

            let Some((source, dest)) = declared.or(queried) else {
                log::debug!("flows: skipping series without a zone pair");
                continue;
            };
            let unit = r.first_text(*ts, &self.config.unit_paths);

            let spec = PeriodSpec {
                value: &self.config.quantity,
                inherited_resolution: r.text_at(*ts, "resolution").or(document_resolution),
                document_start,
                skip_missing: true,
            };

            for period in r.children(*ts, "Period") {
                let Some(expanded) = expand_period(&r, period, &spec)? else {
                    log::debug!("flows: skipping period without start");
                    continue;
                };

                points.extend(expanded.samples.into_iter().map(|sample| {
                    let mut point = CanonicalPoint::new(
                        DocumentFamily::Flows,
                        sample.timestamp,
                        source,
                        sample.value,
                    );
                    point.source_zone = Some(source.to_string());
                    point.dest_zone = Some(dest.to_string());
                    point.unit = unit.map(str::to_string);
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
    use entsoe_sync_source_models::ZonePair;

    use super::*;
    use crate::family_def::Target;
    use crate::parser::for_definition;
    use crate::registry::family;

    fn parse(xml: &str) -> Result<ParsedDocument, ParseError> {
        let target = Target::Pair(ZonePair::new("10YCA-BULGARIA-R", "10YRO-TEL------P"));
        for_definition(&family(DocumentFamily::Flows)).parse(xml, &ParseContext::new(&target))
    }

    #[test]
    fn reads_pair_from_either_element_name() {
        let xml = r#"<Publication_MarketDocument xmlns="urn:iec62325.351:tc57wg16:451-3:publicationdocument:7:3">
  <TimeSeries>
    <in_Domain.mRID codingScheme="A01">10YRO-TEL------P</in_Domain.mRID>
    <out_Domain.mRID codingScheme="A01">10YCA-BULGARIA-R</out_Domain.mRID>
    <quantity_Measure_Unit.name>MAW</quantity_Measure_Unit.name>
    <Period>
      <timeInterval><start>2025-01-01T00:00Z</start></timeInterval>
      <resolution>PT15M</resolution>
      <Point><position>1</position><quantity>120</quantity></Point>
    </Period>
  </TimeSeries>
  <TimeSeries>
    <inBiddingZone_Domain.mRID>10YCA-BULGARIA-R</inBiddingZone_Domain.mRID>
    <outBiddingZone_Domain.mRID>10YRO-TEL------P</outBiddingZone_Domain.mRID>
    <Period>
      <timeInterval><start>2025-01-01T00:00Z</start></timeInterval>
      <resolution>PT15M</resolution>
      <Point><position>1</position><quantity>5</quantity></Point>
    </Period>
  </TimeSeries>
</Publication_MarketDocument>"#;

        let parsed = parse(xml).unwrap();

        let pairs: Vec<_> = parsed
            .points
            .iter()
            .map(|p| (p.source_zone.as_deref(), p.dest_zone.as_deref()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Some("10YCA-BULGARIA-R"), Some("10YRO-TEL------P")),
                (Some("10YRO-TEL------P"), Some("10YCA-BULGARIA-R")),
            ]
        );
        assert_eq!(parsed.points[0].unit.as_deref(), Some("MAW"));
        assert_eq!(parsed.points[0].category, None);
    }

    #[test]
    fn absent_quantities_are_skipped_not_zeroed() {
        let xml = r"<Publication_MarketDocument>
  <TimeSeries>
    <Period>
      <timeInterval><start>2025-01-01T00:00Z</start></timeInterval>
      <resolution>PT60M</resolution>
      <Point><position>1</position></Point>
      <Point><position>2</position><quantity>0</quantity></Point>
    </Period>
  </TimeSeries>
</Publication_MarketDocument>";

        let parsed = parse(xml).unwrap();

        assert_eq!(parsed.points.len(), 1);
        let point = &parsed.points[0];
        assert_eq!(point.value, Some(0.0));
        assert_eq!(point.timestamp_utc.format("%H:%M").to_string(), "01:00");
        // No pair in the document: the queried pair is used.
        assert_eq!(point.source_zone.as_deref(), Some("10YCA-BULGARIA-R"));
        assert_eq!(point.dest_zone.as_deref(), Some("10YRO-TEL------P"));
    }
}
