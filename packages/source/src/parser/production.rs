//! Quantities per production type: installed capacity, actual generation,
//! generation forecast and renewable generation.

use entsoe_sync_market_models::{AGGREGATE_CATEGORY, production_type_label};
use entsoe_sync_source_models::{CanonicalPoint, DocumentFamily};

use super::{DocumentParser, ParseContext, ParsedDocument, PeriodSpec, expand_period, sort_points};
use crate::ParseError;
use crate::family_def::{MissingCategory, ProductionParserConfig};
use crate::xml::{Resolver, TIME_SERIES, check_in_band_error, parse_document};

pub struct ProductionParser {
    family: DocumentFamily,
    config: ProductionParserConfig,
}

impl ProductionParser {
    #[must_use]
    pub const fn new(family: DocumentFamily, config: ProductionParserConfig) -> Self {
        Self { family, config }
    }

    fn category(&self, code: Option<&str>) -> Option<String> {
        match (code, self.config.missing_category) {
            (Some(code), _) => Some(code.to_string()),
            (None, MissingCategory::Aggregate) => Some(AGGREGATE_CATEGORY.to_string()),
            (None, MissingCategory::Keep) => None,
        }
    }
}

impl DocumentParser for ProductionParser {
    fn family(&self) -> DocumentFamily {
        self.family
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
            let category = self.category(r.text_at(*ts, &self.config.psr_path));
            let label = category
                .as_deref()
                .map(|c| production_type_label(c).to_string());
            let zone = r
                .first_text(*ts, &self.config.zone_paths)
                .unwrap_or_else(|| ctx.zone());
            let unit = r.first_text(*ts, &self.config.unit_paths);

            let spec = PeriodSpec {
                value: &self.config.quantity,
                inherited_resolution: r.text_at(*ts, "resolution").or(document_resolution),
                document_start,
                skip_missing: self.config.skip_missing_values,
            };

            for period in r.children(*ts, "Period") {
                let Some(expanded) = expand_period(&r, period, &spec)? else {
                    log::debug!("{}: skipping period without start", self.family);
                    continue;
                };

                points.extend(expanded.samples.into_iter().map(|sample| {
                    let mut point =
                        CanonicalPoint::new(self.family, sample.timestamp, zone, sample.value);
                    point.category.clone_from(&category);
                    point.category_label.clone_from(&label);
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
