#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sync job options, per-entity results and batch summaries.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use entsoe_sync_source_models::DocumentFamily;
use serde::{Deserialize, Serialize};

/// Upper bound on concurrently processed entities.
pub const MAX_CONCURRENCY: usize = 4;

/// Number of failures shown in a batch summary.
pub const FAILURE_SAMPLE_SIZE: usize = 5;

/// Options shared by every sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Inclusive start of the requested window.
    pub start: DateTime<Utc>,
    /// Exclusive end of the requested window.
    pub end: DateTime<Utc>,
    /// Collapse zones into countries. When `false`, points stay per zone.
    pub aggregate: bool,
    /// Abort the batch on the first entity failure.
    pub strict: bool,
    /// Number of entities fetched at once. Sub-windows of one entity are
    /// always fetched in order.
    pub concurrency: usize,
    /// Pause before each entity after the first.
    pub entity_delay: Duration,
}

impl SyncOptions {
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            aggregate: true,
            strict: false,
            concurrency: 1,
            entity_delay: Duration::ZERO,
        }
    }

    /// Concurrency clamped to `1..=MAX_CONCURRENCY`.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

/// One entity (zone, country or zone pair) that could not be synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub entity: String,
    pub error: String,
}

impl fmt::Display for EntityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.entity, self.error)
    }
}

/// What was fetched for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityResult {
    pub entity: String,
    /// Documents (sub-windows and pages) fetched.
    pub documents: usize,
    /// Well-formed documents that held no time series.
    pub empty_documents: usize,
    /// Points kept after clipping and deduplication.
    pub points: usize,
}

/// Outcome of a multi-entity job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub family: DocumentFamily,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Points emitted after aggregation.
    pub points: usize,
    pub results: Vec<EntityResult>,
    pub failures: Vec<EntityFailure>,
}

impl BatchSummary {
    #[must_use]
    pub const fn new(family: DocumentFamily) -> Self {
        Self {
            family,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            points: 0,
            results: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self, result: EntityResult) {
        self.attempted += 1;
        self.succeeded += 1;
        self.results.push(result);
    }

    pub fn record_failure(&mut self, failure: EntityFailure) {
        self.attempted += 1;
        self.failed += 1;
        self.failures.push(failure);
    }

    /// The first [`FAILURE_SAMPLE_SIZE`] failures.
    #[must_use]
    pub fn sample_failures(&self) -> &[EntityFailure] {
        &self.failures[..self.failures.len().min(FAILURE_SAMPLE_SIZE)]
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} attempted, {} succeeded, {} failed, {} points",
            self.family, self.attempted, self.succeeded, self.failed, self.points
        )?;
        for failure in self.sample_failures() {
            write!(f, "\n  - {failure}")?;
        }
        if self.failures.len() > FAILURE_SAMPLE_SIZE {
            write!(
                f,
                "\n  ... and {} more",
                self.failures.len() - FAILURE_SAMPLE_SIZE
            )?;
        }
        Ok(())
    }
}
