//! Human time periods (`"5 minutes"`, `"1h 30m"`) → seconds.
//!
//! Only a fixed unit table is understood: seconds, minutes, hours, days and
//! weeks. Anything else is an error rather than a guess.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::ScenarioError;

static COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*([A-Za-z]+)\s*").expect("period pattern is valid"));

fn unit_seconds(unit: &str) -> Option<u64> {
    match unit.to_ascii_lowercase().as_str() {
        "s" | "second" | "seconds" => Some(1),
        "m" | "minute" | "minutes" => Some(60),
        "h" | "hour" | "hours" => Some(3_600),
        "d" | "day" | "days" => Some(86_400),
        "w" | "week" | "weeks" => Some(604_800),
        _ => None,
    }
}

/// Parse an `after` value: a non-negative integer (seconds) or a period string.
///
/// # Errors
/// [`ScenarioError::InvalidPeriod`] for negative, fractional or unparsable
/// values and for unknown units.
pub fn parse_period(value: &Value) -> Result<u64, ScenarioError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ScenarioError::InvalidPeriod(n.to_string())),
        Value::String(s) => parse_period_str(s),
        other => Err(ScenarioError::InvalidPeriod(other.to_string())),
    }
}

/// Parse a period string into seconds.
///
/// # Errors
/// See [`parse_period`].
pub fn parse_period_str(input: &str) -> Result<u64, ScenarioError> {
    let invalid = || ScenarioError::InvalidPeriod(input.to_owned());
    let trimmed = input.trim();

    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.parse().map_err(|_| invalid());
    }
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut total = 0u64;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let caps = COMPONENT.captures(rest).ok_or_else(invalid)?;
        let amount: u64 = caps[1].parse().map_err(|_| invalid())?;
        let unit = unit_seconds(&caps[2]).ok_or_else(invalid)?;
        total = amount
            .checked_mul(unit)
            .and_then(|s| total.checked_add(s))
            .ok_or_else(invalid)?;
        rest = &rest[caps[0].len()..];
    }
    Ok(total)
}
