//! Border adjacency and expansion into directed zone pairs.
//!
//! Cross-border flows are queried per directed zone pair. Starting from
//! the selected countries, [`build_pairs`] adds both directions of every
//! configured border (so a single selected country still gets inbound and
//! outbound coverage) and expands each country edge into the cross product
//! of both countries' zones.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use entsoe_sync_source_models::ZonePair;

use crate::zones::ZoneCountryMap;
use crate::{ConfigError, normalize_country};

/// Configured neighbors per country.
///
/// Symmetry is not assumed: `A → B` in the configuration says nothing
/// about `B`'s list. [`build_pairs`] adds reverse edges itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborGraph {
    adjacency: BTreeMap<String, BTreeSet<String>>,
}

impl NeighborGraph {
    /// Normalizes a country → neighbors mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCode`] for malformed country codes.
    pub fn new(raw: &BTreeMap<String, Vec<String>>) -> Result<Self, ConfigError> {
        let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (country, neighbors) in raw {
            let entry = adjacency.entry(normalize_country(country)?).or_default();
            for neighbor in neighbors {
                entry.insert(normalize_country(neighbor)?);
            }
        }
        Ok(Self { adjacency })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adjacency.values().all(BTreeSet::is_empty)
    }

    /// Neighbors of `country` in code order (empty if unconfigured).
    pub fn neighbors_of(&self, country: &str) -> impl Iterator<Item = &str> {
        self.adjacency
            .get(country)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}

/// Outcome of expanding selected countries into flow queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborPlan {
    /// Directed zone pairs to query, deduplicated, in generation order.
    pub pairs: Vec<ZonePair>,
    /// Directed country edges the pairs were expanded from.
    pub country_edges: Vec<(String, String)>,
    /// Selected countries without any configured neighbor.
    pub missing_neighbor_config: Vec<String>,
    /// Neighbors that were skipped because they have no zone mapping.
    pub skipped_no_mapping: BTreeSet<String>,
    /// Number of usable neighbors per selected country.
    pub neighbor_counts: BTreeMap<String, usize>,
}

impl NeighborPlan {
    /// Countries appearing on either side of a country edge.
    #[must_use]
    pub fn involved_countries(&self) -> BTreeSet<&str> {
        self.country_edges
            .iter()
            .flat_map(|(a, b)| [a.as_str(), b.as_str()])
            .collect()
    }
}

/// Expands `selected` countries into directed zone pairs along configured
/// borders.
///
/// For every selected country, each neighbor that has a zone mapping (and
/// is not the country itself) yields the edges `country → neighbor` and
/// `neighbor → country`. Each edge becomes one pair per combination of the
/// two countries' zones. `(A, B)` and `(B, A)` are distinct pairs; exact
/// repeats are dropped.
#[must_use]
pub fn build_pairs(
    selected: &[String],
    graph: &NeighborGraph,
    zones: &ZoneCountryMap,
) -> NeighborPlan {
    let mut plan = NeighborPlan::default();

    for src in selected {
        let neighbors: Vec<&str> = graph.neighbors_of(src).collect();
        if neighbors.is_empty() {
            log::warn!("No neighbors configured for {src}");
            plan.missing_neighbor_config.push(src.clone());
            plan.neighbor_counts.insert(src.clone(), 0);
            continue;
        }

        let mut valid = Vec::new();
        for neighbor in neighbors {
            if !zones.has_country(neighbor) {
                plan.skipped_no_mapping.insert(neighbor.to_string());
            } else if neighbor != src {
                valid.push(neighbor.to_string());
            }
        }
        plan.neighbor_counts.insert(src.clone(), valid.len());

        plan.country_edges
            .extend(valid.iter().map(|n| (src.clone(), n.clone())));
        plan.country_edges
            .extend(valid.iter().map(|n| (n.clone(), src.clone())));
    }

    if !plan.skipped_no_mapping.is_empty() {
        log::warn!(
            "Neighbors without zone mapping (skipped): {}",
            plan.skipped_no_mapping
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let mut seen = HashSet::new();
    for (out_country, in_country) in &plan.country_edges {
        for source in zones.country_to_zones(out_country) {
            for dest in zones.country_to_zones(in_country) {
                let pair = ZonePair::new(source.as_str(), dest.as_str());
                if seen.insert(pair.clone()) {
                    plan.pairs.push(pair);
                }
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(entries: &[(&str, &[&str])]) -> ZoneCountryMap {
        ZoneCountryMap::new(
            entries
                .iter()
                .map(|(c, zs)| ((*c).to_string(), zs.iter().map(|z| (*z).to_string()).collect()))
                .collect(),
            &BTreeMap::new(),
        )
        .unwrap()
    }

    fn graph(entries: &[(&str, &[&str])]) -> NeighborGraph {
        NeighborGraph::new(
            &entries
                .iter()
                .map(|(c, ns)| ((*c).to_string(), ns.iter().map(|n| (*n).to_string()).collect()))
                .collect(),
        )
        .unwrap()
    }

    fn selected(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn single_country_gets_both_directions() {
        let z = zones(&[("BG", &["Z-BG"]), ("RO", &["Z-RO"])]);
        let g = graph(&[("BG", &["RO", "GR"])]);

        let plan = build_pairs(&selected(&["BG"]), &g, &z);

        assert_eq!(
            plan.pairs,
            vec![ZonePair::new("Z-BG", "Z-RO"), ZonePair::new("Z-RO", "Z-BG")]
        );
        assert_eq!(plan.skipped_no_mapping, BTreeSet::from(["GR".to_string()]));
        assert_eq!(plan.neighbor_counts.get("BG"), Some(&1));
        assert!(plan.missing_neighbor_config.is_empty());
    }

    #[test]
    fn multi_zone_countries_expand_to_cross_product() {
        let z = zones(&[("DE", &["Z-DE"]), ("DK", &["Z-DK1", "Z-DK2"])]);
        let g = graph(&[("DE", &["DK"])]);

        let plan = build_pairs(&selected(&["DE"]), &g, &z);

        assert_eq!(
            plan.pairs,
            vec![
                ZonePair::new("Z-DE", "Z-DK1"),
                ZonePair::new("Z-DE", "Z-DK2"),
                ZonePair::new("Z-DK1", "Z-DE"),
                ZonePair::new("Z-DK2", "Z-DE"),
            ]
        );
    }

    #[test]
    fn mutual_selection_is_deduplicated() {
        let z = zones(&[("BG", &["Z-BG"]), ("RO", &["Z-RO"])]);
        let g = graph(&[("BG", &["RO"]), ("RO", &["BG"])]);

        let plan = build_pairs(&selected(&["BG", "RO"]), &g, &z);

        assert_eq!(plan.country_edges.len(), 4);
        assert_eq!(
            plan.pairs,
            vec![ZonePair::new("Z-BG", "Z-RO"), ZonePair::new("Z-RO", "Z-BG")]
        );
        assert_eq!(
            plan.involved_countries().into_iter().collect::<Vec<_>>(),
            vec!["BG", "RO"]
        );
    }

    #[test]
    fn reports_missing_config_and_ignores_self_loops() {
        let z = zones(&[("BG", &["Z-BG"]), ("PL", &["Z-PL"])]);
        let g = graph(&[("PL", &["PL"])]);

        let plan = build_pairs(&selected(&["BG", "PL"]), &g, &z);

        assert!(plan.pairs.is_empty());
        assert_eq!(plan.missing_neighbor_config, vec!["BG"]);
        assert_eq!(plan.neighbor_counts.get("PL"), Some(&0));
        assert!(plan.skipped_no_mapping.is_empty());
    }
}
