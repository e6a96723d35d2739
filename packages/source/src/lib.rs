#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Acquisition and normalization of transparency platform documents.
//!
//! A fetch job is described by a [`family_def::FamilyDefinition`] loaded
//! from the embedded [`registry`]. The [`window`] planner splits the
//! requested range into sub-windows the platform accepts, the
//! [`retry::ResilientFetcher`] downloads each one, and the family's
//! [`parser::DocumentParser`] turns the XML into
//! [`entsoe_sync_source_models::CanonicalPoint`] records.

pub mod cancel;
pub mod clock;
pub mod duration;
pub mod family_def;
pub mod parser;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod window;
pub mod xml;

use std::fmt;

/// Classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Connection, DNS or body transfer failure.
    Transport,
    /// A single attempt exceeded its time budget.
    Timeout,
    /// The platform answered with a non-retryable HTTP status.
    Status(u16),
    /// Every attempt failed with a retryable condition.
    RetriesExhausted,
    /// The job was cancelled while the request was outstanding.
    Cancelled,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => f.write_str("transport error"),
            Self::Timeout => f.write_str("timeout"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::RetriesExhausted => f.write_str("retries exhausted"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Terminal failure of a document download.
///
/// Once returned by the fetcher the caller must not retry the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub detail: String,
}

impl FetchError {
    #[must_use]
    pub fn new(kind: FetchErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Returns `true` for conditions the fetcher retries on its own.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Transport | FetchErrorKind::Timeout)
    }
}

/// Errors raised while turning a document into points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The body is not well-formed XML.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// The document is well-formed but carries a platform error.
    #[error("platform error {code}: {text}")]
    InBand {
        /// Reason code (e.g. `999`).
        code: String,
        /// Free-text explanation.
        text: String,
    },

    #[error("invalid timestamp {value:?}")]
    InvalidTimestamp { value: String },

    #[error("invalid point position {value:?}")]
    InvalidPosition { value: String },

    #[error(transparent)]
    InvalidResolution(#[from] duration::DurationError),
}

/// Caller input rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("empty window: start {start} is not before end {end}")]
    EmptyWindow { start: String, end: String },

    #[error("invalid filter: {message}")]
    InvalidFilter { message: String },

    #[error("unknown country {code:?} (known: {})", .known.join(", "))]
    UnknownCountry { code: String, known: Vec<String> },
}

/// Failure while processing a single entity (zone or zone pair).
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl SourceError {
    /// Returns `true` if the job was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Fetch(FetchError {
                kind: FetchErrorKind::Cancelled,
                ..
            })
        )
    }
}
