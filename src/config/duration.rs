// src/config/duration.rs

use std::time::Duration;

use crate::errors::{FarmError, Result};

/// Parse a simple duration string like `"30s"`, `"250ms"`, `"5m"`, `"12h"`.
///
/// A bare `"0"` is accepted as zero.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let trimmed = s.trim();
    let invalid = |reason: String| FarmError::InvalidDuration {
        value: s.to_string(),
        reason,
    };

    if trimmed.is_empty() {
        return Err(invalid("empty duration string".to_string()));
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    // Find the boundary between digits and suffix.
    let idx = trimmed
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| invalid("duration missing unit suffix".to_string()))?;

    let (num_part, unit_part) = trimmed.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| invalid(format!("invalid duration number '{num_part}': {e}")))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(invalid(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            )));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid(format!("duration '{trimmed}' is too large")))
}
