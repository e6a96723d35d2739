#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-country aggregation of zone-level points.
//!
//! Two output modes exist. [`aggregate`] collapses zone points into one
//! point per country group using the family's [`AggregateOp`]. [`enrich`]
//! is the per-zone pass-through: each point keeps its zone and only gains
//! the resolved country.
//!
//! Null values never count as zero. They are left out of sums and means,
//! and a group whose values are all null still produces a point, with a
//! null value.

use std::collections::HashMap;

use chrono::{DateTime, Datelike as _, Utc};
use entsoe_sync_geography::zones::ZoneCountryMap;
use entsoe_sync_source::parser::sort_points;
use entsoe_sync_source_models::{AggregateOp, CanonicalPoint, DedupKey, DocumentFamily};

/// Key points are grouped on before aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// `(country, category, year)`.
    Capacity {
        country: String,
        category: Option<String>,
        year: i32,
    },
    /// `(country, category, timestamp)` for generation, forecast and
    /// renewable points.
    Series {
        country: String,
        category: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// `(country, contract_type, timestamp)`.
    Price {
        country: String,
        contract_type: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// `(source_country, dest_country, timestamp)`.
    Flow {
        source: String,
        dest: String,
        timestamp: DateTime<Utc>,
    },
}

/// Returns the group `point` belongs to, or `None` if one of its zones has
/// no country.
#[must_use]
pub fn group_key(point: &CanonicalPoint, zones: &ZoneCountryMap) -> Option<GroupKey> {
    match point.family {
        DocumentFamily::Flows => {
            let source = zones.zone_to_country(point.source_zone.as_deref()?)?;
            let dest = zones.zone_to_country(point.dest_zone.as_deref()?)?;
            Some(GroupKey::Flow {
                source: source.to_string(),
                dest: dest.to_string(),
                timestamp: point.timestamp_utc,
            })
        }
        DocumentFamily::Capacity => Some(GroupKey::Capacity {
            country: zones.zone_to_country(&point.entity_id)?.to_string(),
            category: point.category.clone(),
            year: point.year.unwrap_or_else(|| point.timestamp_utc.year()),
        }),
        DocumentFamily::Prices => Some(GroupKey::Price {
            country: zones.zone_to_country(&point.entity_id)?.to_string(),
            contract_type: point.contract_type.clone(),
            timestamp: point.timestamp_utc,
        }),
        DocumentFamily::Generation | DocumentFamily::Forecast | DocumentFamily::Renewable => {
            Some(GroupKey::Series {
                country: zones.zone_to_country(&point.entity_id)?.to_string(),
                category: point.category.clone(),
                timestamp: point.timestamp_utc,
            })
        }
    }
}

/// Drops points whose [`DedupKey`] was already seen, keeping the value of
/// the last one at the position of the first.
#[must_use]
pub fn dedup_last_wins(points: Vec<CanonicalPoint>) -> Vec<CanonicalPoint> {
    let mut index: HashMap<DedupKey, usize> = HashMap::with_capacity(points.len());
    let mut out: Vec<CanonicalPoint> = Vec::with_capacity(points.len());

    for point in points {
        let key = point.dedup_key();
        if let Some(&i) = index.get(&key) {
            out[i] = point;
        } else {
            index.insert(key, out.len());
            out.push(point);
        }
    }

    out
}

/// Per-zone pass-through: resolves countries, then deduplicates.
///
/// Points whose zone has no country are kept with `country` unset.
#[must_use]
pub fn enrich(points: Vec<CanonicalPoint>, zones: &ZoneCountryMap) -> Vec<CanonicalPoint> {
    let lookup = |zone: Option<&str>| {
        zone.and_then(|z| zones.zone_to_country(z))
            .map(str::to_string)
    };

    let enriched = points
        .into_iter()
        .map(|mut point| {
            if point.family == DocumentFamily::Flows {
                point.source_country = lookup(point.source_zone.as_deref());
                point.dest_country = lookup(point.dest_zone.as_deref());
                point.country.clone_from(&point.source_country);
            } else {
                point.country = lookup(Some(&point.entity_id));
            }
            point
        })
        .collect();

    dedup_last_wins(enriched)
}

struct Group {
    template: CanonicalPoint,
    sum: f64,
    count: u32,
    mixed_currency: bool,
    mixed_unit: bool,
}

impl Group {
    fn new(template: CanonicalPoint) -> Self {
        let mut group = Self {
            template,
            sum: 0.0,
            count: 0,
            mixed_currency: false,
            mixed_unit: false,
        };
        if let Some(value) = group.template.value {
            group.add_value(value);
        }
        group
    }

    fn add_value(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn add(&mut self, point: &CanonicalPoint) {
        if let Some(value) = point.value {
            self.add_value(value);
        }
        merge_first_seen(
            &mut self.template.currency,
            point.currency.as_ref(),
            &mut self.mixed_currency,
        );
        merge_first_seen(
            &mut self.template.unit,
            point.unit.as_ref(),
            &mut self.mixed_unit,
        );
    }

    fn value(&self, op: AggregateOp) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(match op {
            AggregateOp::Sum => self.sum,
            AggregateOp::Mean => self.sum / f64::from(self.count),
        })
    }
}

/// Keeps the first non-null value and flags any later disagreement.
fn merge_first_seen(current: &mut Option<String>, next: Option<&String>, mixed: &mut bool) {
    match (current.as_ref(), next) {
        (None, Some(next)) => *current = Some(next.clone()),
        (Some(cur), Some(next)) if cur != next => *mixed = true,
        _ => {}
    }
}

/// Collapses zone points into one point per [`GroupKey`].
///
/// Input should already be deduplicated (see [`dedup_last_wins`]).
/// Points with an unmapped zone are dropped. Currency and unit are taken
/// from the first point that has them; a disagreeing group is logged and
/// still aggregated. Output is sorted like parser output.
#[must_use]
pub fn aggregate(
    points: &[CanonicalPoint],
    zones: &ZoneCountryMap,
    op: AggregateOp,
) -> Vec<CanonicalPoint> {
    let mut order: Vec<GroupKey> = Vec::new();
    let mut groups: HashMap<GroupKey, Group> = HashMap::new();
    let mut unmapped = 0_usize;

    for point in points {
        let Some(key) = group_key(point, zones) else {
            unmapped += 1;
            continue;
        };

        if let Some(group) = groups.get_mut(&key) {
            group.add(point);
        } else {
            order.push(key.clone());
            groups.insert(key, Group::new(point.clone()));
        }
    }

    if unmapped > 0 {
        log::debug!("Dropped {unmapped} point(s) with unmapped zones before aggregation");
    }

    let mut out: Vec<CanonicalPoint> = order
        .into_iter()
        .filter_map(|key| {
            let group = groups.remove(&key)?;
            if group.mixed_currency {
                log::warn!(
                    "Mixed currencies in {key:?}; keeping {:?}",
                    group.template.currency
                );
            }
            if group.mixed_unit {
                log::warn!("Mixed units in {key:?}; keeping {:?}", group.template.unit);
            }
            Some(finish(key, &group, op))
        })
        .collect();

    sort_points(&mut out);
    out
}

fn finish(key: GroupKey, group: &Group, op: AggregateOp) -> CanonicalPoint {
    let mut point = group.template.clone();
    point.value = group.value(op);

    match key {
        GroupKey::Flow { source, dest, .. } => {
            point.entity_id.clone_from(&source);
            point.source_zone = None;
            point.dest_zone = None;
            point.country = Some(source.clone());
            point.source_country = Some(source);
            point.dest_country = Some(dest);
        }
        GroupKey::Capacity { country, year, .. } => {
            point.entity_id.clone_from(&country);
            point.country = Some(country);
            point.year = Some(year);
        }
        GroupKey::Series { country, .. } | GroupKey::Price { country, .. } => {
            point.entity_id.clone_from(&country);
            point.country = Some(country);
        }
    }

    point
}
