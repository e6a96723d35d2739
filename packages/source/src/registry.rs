//! Family registry: loads all family definitions from embedded TOML configs.
//!
//! Each `.toml` file in `packages/source/families/` is baked into the
//! binary at compile time via [`include_str!`] and parsed once, on first
//! use.

use std::sync::LazyLock;

use entsoe_sync_source_models::DocumentFamily;

use crate::family_def::{FamilyDefinition, parse_family_toml};

/// TOML configs embedded at compile time.
const FAMILY_TOMLS: &[(&str, &str)] = &[
    ("capacity", include_str!("../families/capacity.toml")),
    ("generation", include_str!("../families/generation.toml")),
    ("forecast", include_str!("../families/forecast.toml")),
    ("renewable", include_str!("../families/renewable.toml")),
    ("prices", include_str!("../families/prices.toml")),
    ("flows", include_str!("../families/flows.toml")),
];

static FAMILIES: LazyLock<Vec<FamilyDefinition>> = LazyLock::new(|| {
    FAMILY_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_family_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
});

/// Returns all family definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (the configs are embedded, and
/// the tests below parse every one of them).
#[must_use]
pub fn all_families() -> &'static [FamilyDefinition] {
    &FAMILIES
}

/// Returns the definition for `family`.
///
/// # Panics
///
/// Panics if the embedded configs lack a definition for `family`.
#[must_use]
pub fn family(family: DocumentFamily) -> &'static FamilyDefinition {
    all_families()
        .iter()
        .find(|def| def.family == family)
        .unwrap_or_else(|| panic!("No embedded definition for {family}"))
}
