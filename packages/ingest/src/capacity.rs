//! Latest installed capacity per production type.
//!
//! Capacity is published once per year. For anchor year `Y` the job asks
//! for year `Y`, falls back to `Y - 1` when that is empty, and keeps the
//! most recent value per production type.

use std::collections::BTreeMap;

use entsoe_sync_source::SourceError;
use entsoe_sync_source::cancel::Cancellation;
use entsoe_sync_source::family_def::{FamilyDefinition, QueryFilters, Target};
use entsoe_sync_source::parser::sort_points;
use entsoe_sync_source::retry::ResilientFetcher;
use entsoe_sync_source::window::{SubWindow, capacity_year_window};
use entsoe_sync_source_models::CanonicalPoint;

use crate::fetch::{EntityFetch, EntityRequest, fetch_entity};

/// Fetches the latest capacity of `zone` for `anchor_year`, falling back
/// one year.
///
/// # Errors
///
/// Returns the first [`SourceError`] hit.
pub async fn fetch_latest_capacity(
    fetcher: &ResilientFetcher,
    cancel: &Cancellation,
    definition: &FamilyDefinition,
    zone: &str,
    filters: &QueryFilters,
    anchor_year: i32,
) -> Result<EntityFetch, SourceError> {
    let mut total = EntityFetch::empty(zone);

    for year in [anchor_year, anchor_year - 1] {
        let Some(window) = capacity_year_window(year) else {
            continue;
        };

        let request = EntityRequest {
            definition,
            target: Target::Zone(zone.to_string()),
            filters,
            window,
            categories: None,
        };
        let fetched = fetch_entity(fetcher, cancel, &request).await?;
        total.result.documents += fetched.result.documents;
        total.result.empty_documents += fetched.result.empty_documents;

        if fetched.points.is_empty() {
            log::info!("{zone}: no installed capacity published for {year}");
            continue;
        }

        total.points = latest_per_type(fetched.points, window, year);
        total.result.points = total.points.len();
        break;
    }

    Ok(total)
}

/// Keeps, per category, the latest point not after `window.end`, stamped
/// with `year`.
#[must_use]
pub fn latest_per_type(
    points: Vec<CanonicalPoint>,
    window: SubWindow,
    year: i32,
) -> Vec<CanonicalPoint> {
    let mut latest: BTreeMap<Option<String>, CanonicalPoint> = BTreeMap::new();

    for point in points {
        if point.timestamp_utc > window.end {
            continue;
        }
        let newer = latest
            .get(&point.category)
            .is_none_or(|current| current.timestamp_utc <= point.timestamp_utc);
        if newer {
            latest.insert(point.category.clone(), point);
        }
    }

    let mut out: Vec<CanonicalPoint> = latest
        .into_values()
        .map(|mut point| {
            point.year = Some(year);
            point
        })
        .collect();
    sort_points(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone as _, Utc};
    use entsoe_sync_source_models::DocumentFamily;

    use super::*;

    fn point(category: &str, ts: DateTime<Utc>, value: f64) -> CanonicalPoint {
        let mut p = CanonicalPoint::new(DocumentFamily::Capacity, ts, "Z", Some(value));
        p.category = Some(category.to_string());
        p
    }

    #[test]
    fn keeps_latest_per_category_and_stamps_year() {
        let window = capacity_year_window(2025).unwrap();
        let early = window.start;
        let later = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let beyond = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

        let out = latest_per_type(
            vec![
                point("B16", later, 12.0),
                point("B16", early, 10.0),
                point("B19", early, 3.0),
                point("B19", beyond, 99.0),
            ],
            window,
            2025,
        );

        let values: Vec<_> = out
            .iter()
            .map(|p| (p.category.as_deref().unwrap(), p.value, p.year))
            .collect();
        assert_eq!(
            values,
            vec![("B19", Some(3.0), Some(2025)), ("B16", Some(12.0), Some(2025))]
        );
    }
}
