//! Duration parsing utilities.

use anyhow::Context;
use std::time::Duration;

/// Parse a duration string like "1h", "30m", "300s", "250ms", "300" or "PT60S".
/// Supports:
/// - Plain numbers (interpreted as seconds, fractions allowed): "300", "0.5"
/// - Milliseconds suffix: "250ms"
/// - Seconds suffix: "300s"
/// - Minutes suffix: "30m"
/// - Hours suffix: "1h"
/// - ISO-8601 time durations: "PT60S", "PT1H30M"
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    if let Some(rest) = s.strip_prefix("PT").or_else(|| s.strip_prefix("pt")) {
        return parse_iso_time(rest).with_context(|| format!("Invalid ISO-8601 duration: {s}"));
    }

    // Check for suffix
    if let Some(num_str) = s.strip_suffix("ms") {
        let millis: u64 = num_str
            .parse()
            .with_context(|| format!("Invalid milliseconds value: {num_str}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(num_str) = s.strip_suffix('h') {
        let hours: u64 = num_str
            .parse()
            .with_context(|| format!("Invalid hours value: {num_str}"))?;
        let secs = hours
            .checked_mul(3600)
            .with_context(|| format!("Hours value out of range: {num_str}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(num_str) = s.strip_suffix('m') {
        let minutes: u64 = num_str
            .parse()
            .with_context(|| format!("Invalid minutes value: {num_str}"))?;
        let secs = minutes
            .checked_mul(60)
            .with_context(|| format!("Minutes value out of range: {num_str}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(num_str) = s.strip_suffix('s') {
        return parse_seconds(num_str);
    }

    // No suffix - treat as seconds
    parse_seconds(s)
}

/// Like [`parse_duration`], but zero means "not set".
pub fn parse_optional_duration(s: &str) -> anyhow::Result<Option<Duration>> {
    let duration = parse_duration(s)?;
    Ok((!duration.is_zero()).then_some(duration))
}

fn parse_seconds(num_str: &str) -> anyhow::Result<Duration> {
    let secs: f64 = num_str
        .parse()
        .with_context(|| format!("Invalid seconds value: {num_str}"))?;
    Duration::try_from_secs_f64(secs).with_context(|| format!("Invalid seconds value: {num_str}"))
}

/// The part of an ISO-8601 duration after "PT": any of `nH`, `nM`, `nS` in order.
fn parse_iso_time(rest: &str) -> anyhow::Result<Duration> {
    if rest.is_empty() {
        anyhow::bail!("no components after PT");
    }
    let mut total = Duration::ZERO;
    let mut number = String::new();
    let mut last_unit = 0;
    for c in rest.chars() {
        let (rank, scale) = match c.to_ascii_uppercase() {
            'H' => (1, 3600.0),
            'M' => (2, 60.0),
            'S' => (3, 1.0),
            c if c.is_ascii_digit() || c == '.' => {
                number.push(c);
                continue;
            }
            other => anyhow::bail!("unexpected character '{other}'"),
        };
        if rank <= last_unit {
            anyhow::bail!("components out of order");
        }
        last_unit = rank;
        let value: f64 = number
            .parse()
            .with_context(|| format!("missing number before '{c}'"))?;
        number.clear();
        total = total
            .checked_add(Duration::try_from_secs_f64(value * scale)?)
            .context("duration out of range")?;
    }
    if !number.is_empty() {
        anyhow::bail!("trailing number without a unit");
    }
    Ok(total)
}
