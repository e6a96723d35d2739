//! Compact duration notation (`P[nD][T[nH][nM]]`) to minutes.
//!
//! Resolutions on the platform are written as ISO-8601 durations such as
//! `PT15M`, `PT60M` or `P1D`. Only day, hour and minute components carry
//! meaning here; other units (years, weeks, months, seconds) are accepted
//! and ignored so that unusual resolutions do not break parsing.

/// A duration string was present but could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resolution {input:?}: {reason}")]
pub struct DurationError {
    pub input: String,
    pub reason: &'static str,
}

/// Step used when a document carries no usable resolution.
pub const DEFAULT_STEP_MINUTES: u32 = 60;

/// Converts a duration to whole minutes.
///
/// Returns `Ok(None)` for an empty string so callers can apply their own
/// fallback. A zero duration (e.g. `P1Y`, where every unit is ignored)
/// yields `Ok(Some(0))`.
///
/// # Errors
///
/// Returns [`DurationError`] if the string is present but not a valid
/// duration.
pub fn to_minutes(input: &str) -> Result<Option<u32>, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let err = |reason| DurationError {
        input: input.to_string(),
        reason,
    };

    let Some(body) = trimmed.strip_prefix('P') else {
        return Err(err("must start with 'P'"));
    };

    let mut in_time = false;
    let mut digits = String::new();
    let mut components = 0_u32;
    let mut total: u32 = 0;

    for c in body.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        if c == 'T' {
            if in_time {
                return Err(err("repeated 'T'"));
            }
            if !digits.is_empty() {
                return Err(err("number without a unit"));
            }
            in_time = true;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            return Err(err("unexpected character"));
        }
        if digits.is_empty() {
            return Err(err("unit without a number"));
        }

        let n: u32 = digits.parse().map_err(|_| err("number out of range"))?;
        digits.clear();
        components += 1;

        let factor = match (in_time, c) {
            (false, 'D') => 1440,
            (true, 'H') => 60,
            (true, 'M') => 1,
            _ => 0,
        };

        total = n
            .checked_mul(factor)
            .and_then(|m| total.checked_add(m))
            .ok_or_else(|| err("number out of range"))?;
    }

    if !digits.is_empty() {
        return Err(err("number without a unit"));
    }
    if components == 0 {
        return Err(err("no components"));
    }

    Ok(Some(total))
}

/// Resolves the step size of a period from its (optional) resolution.
///
/// Absent, empty and zero-length resolutions fall back to `fallback`.
///
/// # Errors
///
/// Returns [`DurationError`] if the resolution is present but malformed.
pub fn resolve_step(resolution: Option<&str>, fallback: u32) -> Result<u32, DurationError> {
    let Some(raw) = resolution else {
        return Ok(fallback);
    };

    Ok(match to_minutes(raw)? {
        None | Some(0) => fallback,
        Some(minutes) => minutes,
    })
}
