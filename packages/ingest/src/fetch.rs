//! Fetching everything one entity has in a window.
//!
//! The requested window is split by the planner, and each sub-window (and
//! page, for paginated families) is fetched and parsed strictly in order.
//! The parsed points are concatenated, clipped to the requested window and
//! deduplicated. A parse failure fails the entity as a whole; nothing from
//! a failed entity is returned.

use entsoe_sync_aggregate::dedup_last_wins;
use entsoe_sync_ingest_models::EntityResult;
use entsoe_sync_source::SourceError;
use entsoe_sync_source::cancel::Cancellation;
use entsoe_sync_source::family_def::{FamilyDefinition, QueryFilters, Target};
use entsoe_sync_source::parser::{DocumentParser, ParseContext, ParsedDocument, for_definition};
use entsoe_sync_source::retry::ResilientFetcher;
use entsoe_sync_source::window::{SubWindow, is_last_page, page_offsets, plan};
use entsoe_sync_source_models::CanonicalPoint;

/// One entity's worth of work.
#[derive(Debug, Clone)]
pub struct EntityRequest<'a> {
    pub definition: &'a FamilyDefinition,
    pub target: Target,
    pub filters: &'a QueryFilters,
    pub window: SubWindow,
    /// Keep only points with one of these categories.
    pub categories: Option<&'a [String]>,
}

/// Points and counters for one entity.
#[derive(Debug, Clone, Default)]
pub struct EntityFetch {
    pub points: Vec<CanonicalPoint>,
    pub result: EntityResult,
}

impl EntityFetch {
    #[must_use]
    pub fn empty(entity: impl Into<String>) -> Self {
        Self {
            points: Vec::new(),
            result: EntityResult {
                entity: entity.into(),
                ..EntityResult::default()
            },
        }
    }
}

/// Fetches and parses every sub-window (and page) of `request`.
///
/// # Errors
///
/// Returns the first [`SourceError`] hit, including in-band platform
/// errors such as "no matching data".
pub async fn fetch_entity(
    fetcher: &ResilientFetcher,
    cancel: &Cancellation,
    request: &EntityRequest<'_>,
) -> Result<EntityFetch, SourceError> {
    let definition = request.definition;
    let parser = for_definition(definition);
    let ctx = ParseContext::new(&request.target);
    let mut fetched = EntityFetch::empty(request.target.to_string());
    let mut points = Vec::new();

    for sub in plan(&request.window.start, &request.window.end, &definition.window) {
        let Some(pagination) = &definition.pagination else {
            let params = definition.query_params(&request.target, &sub, request.filters, None)?;
            let parsed =
                fetch_document(fetcher, cancel, parser.as_ref(), &ctx, &params, &mut fetched.result)
                    .await?;
            points.extend(parsed.points);
            continue;
        };

        let mut exhausted = true;
        for offset in page_offsets(pagination) {
            let params =
                definition.query_params(&request.target, &sub, request.filters, Some(offset))?;
            let parsed =
                fetch_document(fetcher, cancel, parser.as_ref(), &ctx, &params, &mut fetched.result)
                    .await?;
            let last = is_last_page(parsed.series_count, pagination);
            points.extend(parsed.points);
            if last {
                exhausted = false;
                break;
            }
        }
        if exhausted {
            log::warn!(
                "{}: {} {}..{} still had data at offset {}",
                definition.family,
                request.target,
                sub.start,
                sub.end,
                pagination.max_offset
            );
        }
    }

    points.retain(|p| request.window.contains(p.timestamp_utc));
    if let Some(categories) = request.categories {
        points.retain(|p| {
            p.category
                .as_ref()
                .is_some_and(|c| categories.contains(c))
        });
    }

    fetched.points = dedup_last_wins(points);
    fetched.result.points = fetched.points.len();
    Ok(fetched)
}

async fn fetch_document(
    fetcher: &ResilientFetcher,
    cancel: &Cancellation,
    parser: &dyn DocumentParser,
    ctx: &ParseContext<'_>,
    params: &[(String, String)],
    result: &mut EntityResult,
) -> Result<ParsedDocument, SourceError> {
    let body = fetcher.fetch(params, cancel).await?;
    result.documents += 1;

    let parsed = parser.parse(&body, ctx)?;
    if parsed.series_count == 0 {
        log::debug!("{}: {}: document without time series", parser.family(), ctx.target);
        result.empty_documents += 1;
    }
    Ok(parsed)
}
