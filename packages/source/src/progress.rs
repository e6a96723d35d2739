//! Progress reporting for multi-entity fetch jobs.
//!
//! The job layer reports one unit of work per zone (or zone pair). How
//! that is rendered, as an `indicatif` bar or not at all, is decided by the
//! binary.

use std::sync::Arc;

/// Receives progress updates from a running job.
///
/// Must be `Send + Sync` because entities may be processed concurrently.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of entities the job will process.
    fn set_total(&self, total: u64);

    /// Marks `delta` more entities as done.
    fn inc(&self, delta: u64);

    /// Shows which entity is currently being fetched.
    fn set_message(&self, msg: String);

    /// Marks the job as finished with a summary line.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
