use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::error::PollError;
use crate::core::models::usage::{UsagePeriod, UsageSnapshot, DEFAULT_LIMIT_UNITS};

const SESSION_KEY: &str = "five_hour";
const WEEKLY_KEY: &str = "seven_day";
const WEEKLY_SECONDARY_KEY: &str = "seven_day_sonnet";

/// Build a new snapshot from a usage body.
///
/// Periods missing from the body keep their values from `previous`. A body that
/// is not a JSON object is rejected outright.
pub fn parse_usage(
    body: &str,
    previous: &UsageSnapshot,
    fetched_at: DateTime<Utc>,
) -> Result<UsageSnapshot, PollError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| PollError::BodyParse(e.to_string()))?;
    let Value::Object(json) = value else {
        return Err(PollError::BodyParse("Invalid JSON".to_string()));
    };

    let session = merge_period(&json, SESSION_KEY, &previous.session);
    let weekly = merge_period(&json, WEEKLY_KEY, &previous.weekly);
    let (weekly_secondary, has_weekly_secondary) = match period_object(&json, WEEKLY_SECONDARY_KEY) {
        Some(raw) => (parse_period(raw, &previous.weekly_secondary, WEEKLY_SECONDARY_KEY), true),
        None => (previous.weekly_secondary.clone(), false),
    };

    let snapshot = UsageSnapshot {
        session,
        weekly,
        weekly_secondary,
        has_weekly_secondary,
        fetched_at: Some(fetched_at),
        last_error: None,
    };

    debug!(
        "Parsed: session {}%, weekly {}%{}",
        snapshot.session.percent(),
        snapshot.weekly.percent(),
        snapshot
            .secondary()
            .map(|p| format!(", weekly secondary {}%", p.percent()))
            .unwrap_or_default()
    );
    Ok(snapshot)
}

fn period_object<'a>(json: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    json.get(key).and_then(Value::as_object)
}

fn merge_period(json: &Map<String, Value>, key: &str, previous: &UsagePeriod) -> UsagePeriod {
    match period_object(json, key) {
        Some(raw) => parse_period(raw, previous, key),
        None => previous.clone(),
    }
}

fn parse_period(raw: &Map<String, Value>, previous: &UsagePeriod, key: &str) -> UsagePeriod {
    let mut period = previous.clone();

    if let Some(utilization) = raw.get("utilization").and_then(Value::as_f64) {
        period.used_units = utilization.max(0.0).trunc() as u32;
        period.limit_units = DEFAULT_LIMIT_UNITS;
    }

    // Absent key keeps the previous reset time, like a missing utilization.
    if let Some(raw_reset) = raw.get("resets_at") {
        period.resets_at = match raw_reset.as_str() {
            Some(text) => {
                let parsed = parse_timestamp(text);
                if parsed.is_none() {
                    warn!("Failed to parse {} reset time: {}", key, text);
                }
                parsed
            }
            None => None,
        };
    }

    period
}

/// RFC 3339 / ISO-8601 timestamp, fractional seconds optional.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
