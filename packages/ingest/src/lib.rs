#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sync jobs for transparency platform market data.
//!
//! Each job resolves a country selection to zones (or zone pairs), fetches
//! every entity through [`fetch::fetch_entity`], and then either aggregates
//! per country or passes zone points through. One failing entity is
//! recorded and skipped unless the job runs in strict mode.

pub mod capacity;
pub mod fetch;
pub mod sink;

use std::collections::HashSet;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;

use chrono::Datelike as _;
use entsoe_sync_aggregate::{aggregate, dedup_last_wins, enrich};
use entsoe_sync_geography::neighbors::{NeighborPlan, build_pairs};
use entsoe_sync_geography::{ConfigError, MarketConfig};
use entsoe_sync_ingest_models::{BatchSummary, EntityFailure, SyncOptions};
use entsoe_sync_market_models::{ContractType, DEFAULT_RENEWABLE_TYPES};
use entsoe_sync_source::cancel::Cancellation;
use entsoe_sync_source::clock::{Clock, SystemClock};
use entsoe_sync_source::family_def::{FamilyDefinition, QueryFilters, Target, validate_psr_code};
use entsoe_sync_source::progress::{ProgressCallback, null_progress};
use entsoe_sync_source::registry;
use entsoe_sync_source::retry::ResilientFetcher;
use entsoe_sync_source::window::{PricePeriod, SubWindow, price_period, validate_window};
use entsoe_sync_source::{SourceError, ValidationError};
use entsoe_sync_source_models::{CanonicalPoint, DocumentFamily, ZonePair};

use crate::capacity::fetch_latest_capacity;
use crate::fetch::{EntityFetch, EntityRequest, fetch_entity};

/// Errors that end a sync job.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An entity failed in strict mode.
    #[error("{entity}: {source}")]
    Entity { entity: String, source: SourceError },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything a job needs besides its own arguments.
pub struct SyncContext {
    pub fetcher: ResilientFetcher,
    pub market: MarketConfig,
    pub clock: Arc<dyn Clock>,
    pub cancel: Cancellation,
    pub progress: Arc<dyn ProgressCallback>,
}

impl SyncContext {
    #[must_use]
    pub fn new(fetcher: ResilientFetcher, market: MarketConfig) -> Self {
        Self {
            fetcher,
            market,
            clock: Arc::new(SystemClock),
            cancel: Cancellation::never(),
            progress: null_progress(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }
}

/// Points produced by a job, and how it went.
#[derive(Debug, Clone)]
pub struct SyncOutput {
    pub points: Vec<CanonicalPoint>,
    pub summary: BatchSummary,
}

// ── Family jobs ──────────────────────────────────────────────────────────

/// Syncs actual generation or the generation forecast.
///
/// `selection` is `ALL` or a comma-separated list of country codes.
///
/// # Errors
///
/// Returns [`SyncError`] on invalid input, cancellation, or (in strict
/// mode) the first entity failure.
pub async fn sync_production(
    ctx: &SyncContext,
    family: DocumentFamily,
    selection: &str,
    psr_type: Option<String>,
    options: &SyncOptions,
) -> Result<SyncOutput, SyncError> {
    if !matches!(family, DocumentFamily::Generation | DocumentFamily::Forecast) {
        return Err(ValidationError::InvalidFilter {
            message: format!("{family} is not a production time series"),
        }
        .into());
    }

    if let Some(code) = &psr_type {
        validate_psr_code(code)?;
    }

    let definition = registry::family(family);
    let filters = QueryFilters {
        psr_type,
        contract_type: None,
    };
    sync_windowed(ctx, definition, selection, &filters, None, options).await
}

/// Syncs wind and solar generation, keeping only `psr_types` (solar and
/// wind when empty).
///
/// # Errors
///
/// See [`sync_production`].
pub async fn sync_renewable(
    ctx: &SyncContext,
    selection: &str,
    psr_types: &[String],
    options: &SyncOptions,
) -> Result<SyncOutput, SyncError> {
    let allowed: Vec<String> = if psr_types.is_empty() {
        DEFAULT_RENEWABLE_TYPES.iter().map(|c| (*c).to_string()).collect()
    } else {
        psr_types.to_vec()
    };
    for code in &allowed {
        validate_psr_code(code)?;
    }

    let definition = registry::family(DocumentFamily::Renewable);
    let filters = QueryFilters::default();
    sync_windowed(
        ctx,
        definition,
        selection,
        &filters,
        Some(allowed.as_slice()),
        options,
    )
    .await
}

/// Syncs prices for one contract type.
///
/// # Errors
///
/// See [`sync_production`].
pub async fn sync_prices(
    ctx: &SyncContext,
    selection: &str,
    contract: ContractType,
    options: &SyncOptions,
) -> Result<SyncOutput, SyncError> {
    let definition = registry::family(DocumentFamily::Prices);
    let filters = QueryFilters {
        psr_type: None,
        contract_type: Some(contract),
    };
    sync_windowed(ctx, definition, selection, &filters, None, options).await
}

/// Resolves a named price period, rejecting combinations the platform
/// does not publish.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidFilter`] for `dayahead` with an
/// intraday contract.
pub fn prices_window(
    clock: &dyn Clock,
    period: PricePeriod,
    contract: ContractType,
) -> Result<SubWindow, ValidationError> {
    if period == PricePeriod::DayAhead && contract != ContractType::DayAhead {
        return Err(ValidationError::InvalidFilter {
            message: format!("period {period} requires contract {}", ContractType::DayAhead),
        });
    }
    Ok(price_period(clock, period))
}

/// Expands a country selection into directed zone pairs along configured
/// borders.
///
/// # Errors
///
/// Returns [`ConfigError::Empty`] if no borders are configured, and a
/// [`ValidationError`] for unknown countries.
pub fn neighbor_plan(market: &MarketConfig, selection: &str) -> Result<NeighborPlan, SyncError> {
    if market.neighbors().is_empty() {
        return Err(ConfigError::Empty {
            what: "neighbor configuration".to_string(),
        }
        .into());
    }

    let selected = market.zones().select(selection)?;
    let plan = build_pairs(&selected, market.neighbors(), market.zones());

    log::info!(
        "Neighbor plan: {} selected, {} countries involved, {} zone pairs",
        selected.len(),
        plan.involved_countries().len(),
        plan.pairs.len()
    );
    if !plan.missing_neighbor_config.is_empty() {
        log::warn!(
            "No neighbor configuration for: {}",
            plan.missing_neighbor_config.join(", ")
        );
    }

    Ok(plan)
}

/// Syncs physical flows across the borders of the selected countries, in
/// both directions.
///
/// # Errors
///
/// See [`sync_production`] and [`neighbor_plan`].
pub async fn sync_flows(
    ctx: &SyncContext,
    selection: &str,
    options: &SyncOptions,
) -> Result<SyncOutput, SyncError> {
    validate_window(options.start, options.end)?;
    let plan = neighbor_plan(&ctx.market, selection)?;
    let targets = plan.pairs.into_iter().map(Target::Pair).collect();

    let definition = registry::family(DocumentFamily::Flows);
    let filters = &QueryFilters::default();
    let window = SubWindow {
        start: options.start,
        end: options.end,
    };

    run_batch(ctx, definition, targets, options, move |target: Target| async move {
        let request = EntityRequest {
            definition,
            target,
            filters,
            window,
            categories: None,
        };
        fetch_entity(&ctx.fetcher, &ctx.cancel, &request).await
    })
    .await
}

/// Syncs the latest installed capacity per production type, anchored on
/// the context clock's current year.
///
/// The window in `options` is not used.
///
/// # Errors
///
/// See [`sync_production`].
pub async fn sync_latest_capacity(
    ctx: &SyncContext,
    selection: &str,
    psr_type: Option<String>,
    options: &SyncOptions,
) -> Result<SyncOutput, SyncError> {
    if let Some(code) = &psr_type {
        validate_psr_code(code)?;
    }

    let definition = registry::family(DocumentFamily::Capacity);
    let filters = &QueryFilters {
        psr_type,
        contract_type: None,
    };
    let anchor_year = ctx.clock.now().year();
    log::info!("Installed capacity anchored on {anchor_year}");

    let targets = zone_targets(&ctx.market, selection)?;

    run_batch(ctx, definition, targets, options, move |target: Target| async move {
        let zone = target.to_string();
        fetch_latest_capacity(
            &ctx.fetcher,
            &ctx.cancel,
            definition,
            &zone,
            filters,
            anchor_year,
        )
        .await
    })
    .await
}

// ── Shared machinery ─────────────────────────────────────────────────────

/// Zones of the selected countries, in selection order, without repeats.
///
/// # Errors
///
/// Returns [`ValidationError`] for unknown countries.
pub fn zone_targets(market: &MarketConfig, selection: &str) -> Result<Vec<Target>, SyncError> {
    let countries = market.zones().select(selection)?;
    let mut seen = HashSet::new();

    Ok(countries
        .iter()
        .flat_map(|c| market.zones().country_to_zones(c))
        .filter(|zone| seen.insert(zone.as_str()))
        .map(|zone| Target::Zone(zone.clone()))
        .collect())
}

async fn sync_windowed(
    ctx: &SyncContext,
    definition: &FamilyDefinition,
    selection: &str,
    filters: &QueryFilters,
    categories: Option<&[String]>,
    options: &SyncOptions,
) -> Result<SyncOutput, SyncError> {
    validate_window(options.start, options.end)?;
    let targets = zone_targets(&ctx.market, selection)?;
    let window = SubWindow {
        start: options.start,
        end: options.end,
    };

    run_batch(ctx, definition, targets, options, move |target: Target| async move {
        let request = EntityRequest {
            definition,
            target,
            filters,
            window,
            categories,
        };
        fetch_entity(&ctx.fetcher, &ctx.cancel, &request).await
    })
    .await
}

/// Runs `fetch` for every target, `options.concurrency` at a time, then
/// aggregates or enriches the collected points.
///
/// `options.entity_delay` separates the start of consecutive entities
/// whatever the concurrency, and is cut short by cancellation.
async fn run_batch<F, Fut>(
    ctx: &SyncContext,
    definition: &FamilyDefinition,
    targets: Vec<Target>,
    options: &SyncOptions,
    fetch: F,
) -> Result<SyncOutput, SyncError>
where
    F: Fn(Target) -> Fut,
    Fut: Future<Output = Result<EntityFetch, SourceError>>,
{
    use futures::stream::{self, StreamExt as _};

    let family = definition.family;
    let mut summary = BatchSummary::new(family);
    let delay = options.entity_delay;

    log::info!(
        "{}: {} entities, {} .. {}",
        definition.name,
        targets.len(),
        options.start,
        options.end
    );
    ctx.progress.set_total(targets.len() as u64);

    let fetch = &fetch;
    let cancel = &ctx.cancel;
    let mut outcomes = pin!(
        stream::iter(targets.into_iter().enumerate())
            .then(|(i, target)| async move {
                if i > 0 && !delay.is_zero() {
                    tokio::select! {
                        () = cancel.cancelled() => {}
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                target
            })
            .map(|target| async move {
                ctx.progress.set_message(format!("{family} {target}"));
                let outcome = fetch(target.clone()).await;
                (target, outcome)
            })
            .buffered(options.effective_concurrency())
    );

    let mut points = Vec::new();
    while let Some((target, outcome)) = outcomes.next().await {
        ctx.progress.inc(1);
        match outcome {
            Ok(fetched) => {
                log::info!(
                    "{family}: {target}: {} points from {} documents",
                    fetched.result.points,
                    fetched.result.documents
                );
                points.extend(fetched.points);
                summary.record_success(fetched.result);
            }
            Err(e) if e.is_cancelled() => return Err(SyncError::Cancelled),
            Err(e) if options.strict => {
                log::error!("{family}: {target}: {e}");
                return Err(SyncError::Entity {
                    entity: target.to_string(),
                    source: e,
                });
            }
            Err(e) => {
                log::warn!("{family}: {target}: {e}");
                summary.record_failure(EntityFailure {
                    entity: target.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    let points = if options.aggregate {
        aggregate(&dedup_last_wins(points), ctx.market.zones(), definition.aggregate)
    } else {
        enrich(points, ctx.market.zones())
    };

    summary.points = points.len();
    ctx.progress.finish(format!(
        "{family}: {}/{} entities, {} points",
        summary.succeeded, summary.attempted, summary.points
    ));
    log::info!("{summary}");

    Ok(SyncOutput { points, summary })
}

/// Renders the first `n` pairs of a plan, e.g. for a dry run.
#[must_use]
pub fn sample_pairs(pairs: &[ZonePair], n: usize) -> Vec<String> {
    pairs.iter().take(n).map(ToString::to_string).collect()
}
