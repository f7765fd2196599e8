use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quota limit every period is normalized to.
pub const DEFAULT_LIMIT_UNITS: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePeriod {
    /// Units consumed in this window (0 - limit)
    pub used_units: u32,
    /// Size of the window, always > 0
    pub limit_units: u32,
    /// When the window resets
    pub resets_at: Option<DateTime<Utc>>,
}

impl Default for UsagePeriod {
    fn default() -> Self {
        Self {
            used_units: 0,
            limit_units: DEFAULT_LIMIT_UNITS,
            resets_at: None,
        }
    }
}

impl UsagePeriod {
    /// Fraction of the window used (0.0 - 1.0), derived from the counters on every call.
    pub fn percentage(&self) -> f64 {
        if self.limit_units == 0 {
            return 0.0;
        }
        (self.used_units as f64 / self.limit_units as f64).clamp(0.0, 1.0)
    }

    /// Whole percent used (0 - 100), truncated.
    pub fn percent(&self) -> u8 {
        if self.limit_units == 0 {
            return 0;
        }
        (u64::from(self.used_units) * 100 / u64::from(self.limit_units)).min(100) as u8
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// 5-hour session window
    pub session: UsagePeriod,
    /// 7-day window
    pub weekly: UsagePeriod,
    /// Model-specific 7-day window, only meaningful when `has_weekly_secondary`
    pub weekly_secondary: UsagePeriod,
    pub has_weekly_secondary: bool,
    /// When the last successful fetch completed (None until the first one)
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl UsageSnapshot {
    pub fn has_data(&self) -> bool {
        self.fetched_at.is_some()
    }

    /// Secondary window, if the backend reported one.
    pub fn secondary(&self) -> Option<&UsagePeriod> {
        self.has_weekly_secondary.then_some(&self.weekly_secondary)
    }

    /// Copy of this snapshot with only the error message replaced.
    pub fn with_error(&self, message: impl Into<String>) -> Self {
        Self {
            last_error: Some(message.into()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_used_over_limit() {
        let period = UsagePeriod {
            used_units: 82,
            limit_units: 100,
            resets_at: None,
        };
        assert!((period.percentage() - 0.82).abs() < 1e-10);
        assert_eq!(period.percent(), 82);
    }

    #[test]
    fn percent_uses_integer_math() {
        let period = UsagePeriod {
            used_units: 29,
            limit_units: 100,
            resets_at: None,
        };
        assert_eq!(period.percent(), 29);
    }

    #[test]
    fn percentage_zero_limit_is_zero() {
        let period = UsagePeriod {
            used_units: 5,
            limit_units: 0,
            resets_at: None,
        };
        assert_eq!(period.percentage(), 0.0);
    }

    #[test]
    fn default_snapshot_is_empty() {
        let snapshot = UsageSnapshot::default();
        assert!(!snapshot.has_data());
        assert_eq!(snapshot.session.limit_units, 100);
        assert!(snapshot.secondary().is_none());
    }

    #[test]
    fn with_error_keeps_periods() {
        let mut snapshot = UsageSnapshot::default();
        snapshot.session.used_units = 40;
        let failed = snapshot.with_error("HTTP 500");
        assert_eq!(failed.session.used_units, 40);
        assert_eq!(failed.last_error.as_deref(), Some("HTTP 500"));
        assert!(snapshot.last_error.is_none());
    }
}
