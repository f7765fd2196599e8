use tracing::debug;

/// Session percentages that raise an alert, ascending.
pub const THRESHOLDS: [u8; 4] = [25, 50, 75, 90];

pub const ALERT_TITLE: &str = "Claude Usage Alert";

/// Outcome of one threshold evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub last_notified: u8,
    /// Thresholds crossed by this evaluation, ascending
    pub alerts: Vec<u8>,
}

/// Greatest threshold `<= percent`, or 0.
pub fn normalize_threshold(percent: u8) -> u8 {
    THRESHOLDS
        .iter()
        .copied()
        .filter(|t| *t <= percent)
        .last()
        .unwrap_or(0)
}

/// Decide which alerts fire for `current_percent` given the last threshold already alerted.
///
/// Rising through thresholds emits one alert per threshold, in order. When usage
/// has dropped below the last alerted threshold and nothing rose, the bar is lowered
/// silently so the same thresholds fire again on the next rise.
pub fn evaluate(current_percent: u8, last_notified: u8) -> Decision {
    let mut last = last_notified;
    let mut alerts = Vec::new();

    for threshold in THRESHOLDS {
        if current_percent >= threshold && last < threshold {
            alerts.push(threshold);
            last = threshold;
        }
    }

    if alerts.is_empty() && current_percent < last {
        let lowered = normalize_threshold(current_percent);
        debug!(
            "Resetting notification threshold from {}% to {}%",
            last, lowered
        );
        last = lowered;
    }

    Decision {
        last_notified: last,
        alerts,
    }
}

pub fn alert_message(percentage: u8) -> String {
    format!("You've reached {}% of your 5-hour session limit", percentage)
}
