//! Query window planning.
//!
//! The platform rejects queries spanning more than a family-specific
//! maximum (one year) and expects bounds aligned to the market time unit.
//! [`plan`] turns an arbitrary `[start, end)` range into consecutive,
//! non-overlapping sub-windows that satisfy both constraints. Paginated
//! families additionally walk [`page_offsets`] within each sub-window.
//!
//! The helpers at the bottom derive common windows from an injected
//! [`Clock`].

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::ValidationError;
use crate::clock::Clock;
use crate::family_def::{Pagination, WindowLimits};

/// Compact `yyyyMMddHHmm` form used in request parameters.
const COMPACT_FORMAT: &str = "%Y%m%d%H%M";

/// A single `[start, end)` query window in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SubWindow {
    #[must_use]
    pub fn compact_start(&self) -> String {
        self.start.format(COMPACT_FORMAT).to_string()
    }

    #[must_use]
    pub fn compact_end(&self) -> String {
        self.end.format(COMPACT_FORMAT).to_string()
    }

    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Floors `instant` to a multiple of `mtu_minutes` since the epoch.
#[must_use]
pub fn floor_to_mtu(instant: DateTime<Utc>, mtu_minutes: u32) -> DateTime<Utc> {
    if mtu_minutes == 0 {
        return instant;
    }
    let step = i64::from(mtu_minutes) * 60;
    let secs = instant.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(step), 0).unwrap_or(instant)
}

/// Splits `[start, end)` into sub-windows the platform accepts.
///
/// Both bounds are converted to UTC and floored to the MTU first. The
/// result covers the floored range exactly: `sub[i].end == sub[i + 1].start`
/// and no sub-window is longer than `max_span_days`. A degenerate range
/// (`start >= end` after flooring) plans to nothing.
#[must_use]
pub fn plan<Tz: TimeZone>(
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
    limits: &WindowLimits,
) -> Vec<SubWindow> {
    let start = floor_to_mtu(start.with_timezone(&Utc), limits.mtu_minutes);
    let end = floor_to_mtu(end.with_timezone(&Utc), limits.mtu_minutes);

    if start >= end {
        return Vec::new();
    }

    let span = Duration::days(i64::from(limits.max_span_days.max(1)));
    let mut windows = Vec::new();
    let mut cursor = start;

    while cursor < end {
        let next = (cursor + span).min(end);
        windows.push(SubWindow {
            start: cursor,
            end: next,
        });
        cursor = next;
    }

    windows
}

/// Offsets to request within one sub-window, in order.
///
/// Callers stop early once [`is_last_page`] says so.
pub fn page_offsets(pagination: &Pagination) -> impl Iterator<Item = u32> {
    let step = usize::try_from(pagination.page_size.max(1)).unwrap_or(usize::MAX);
    (0..=pagination.max_offset).step_by(step)
}

/// A page shorter than the page size (or empty) is the last one.
#[must_use]
pub fn is_last_page(records: usize, pagination: &Pagination) -> bool {
    u32::try_from(records).is_ok_and(|n| n < pagination.page_size)
}

/// Rejects a caller-supplied window that is empty or inverted.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyWindow`] if `start >= end`.
pub fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ValidationError> {
    if start < end {
        Ok(())
    } else {
        Err(ValidationError::EmptyWindow {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        })
    }
}

/// Parses an instant as written by the platform or a user.
///
/// Accepts RFC 3339 (`2025-01-01T00:00:00Z`), the platform's
/// minute-precision form (`2025-01-01T00:00Z`), naive date-times (taken as
/// UTC) and bare dates (midnight UTC).
#[must_use]
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = value.strip_suffix('Z').unwrap_or(value);
    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(naive, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|n| n.and_utc())
}

// ── Clock-derived windows ────────────────────────────────────────────────

/// The last `hours` hours, ending at the next top of the hour.
#[must_use]
pub fn lookback(clock: &dyn Clock, hours: u32) -> SubWindow {
    let end = floor_to_mtu(clock.now(), 60) + Duration::hours(1);
    SubWindow {
        start: end - Duration::hours(i64::from(hours)),
        end,
    }
}

/// Named single-day windows for price queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum PricePeriod {
    /// Today, 00:00 UTC to 24:00 UTC.
    Today,
    /// Tomorrow, the delivery day of the day-ahead auction.
    #[strum(to_string = "dayahead", serialize = "day-ahead")]
    DayAhead,
}

/// Resolves a [`PricePeriod`] against `clock`.
#[must_use]
pub fn price_period(clock: &dyn Clock, period: PricePeriod) -> SubWindow {
    let today = floor_to_mtu(clock.now(), 24 * 60);
    let start = match period {
        PricePeriod::Today => today,
        PricePeriod::DayAhead => today + Duration::days(1),
    };
    SubWindow {
        start,
        end: start + Duration::days(1),
    }
}

/// Publication window of installed capacity for `year`:
/// `[year-1-12-31T23:00Z, year-12-31T23:00Z)`.
#[must_use]
pub fn capacity_year_window(year: i32) -> Option<SubWindow> {
    let at = |y: i32| {
        NaiveDate::from_ymd_opt(y, 12, 31)
            .and_then(|d| d.and_hms_opt(23, 0, 0))
            .map(|n| n.and_utc())
    };
    Some(SubWindow {
        start: at(year - 1)?,
        end: at(year)?,
    })
}
