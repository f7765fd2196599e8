use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Severity band for a usage fraction, used to pick a display colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageLevel {
    Normal,
    Warning,
    Critical,
}

impl UsageLevel {
    /// Below 70% is normal, below 90% a warning, anything above critical.
    pub fn from_fraction(percentage: f64) -> Self {
        if percentage < 0.7 {
            Self::Normal
        } else if percentage < 0.9 {
            Self::Warning
        } else {
            Self::Critical
        }
    }
}

/// Returns "{percent}% used".
pub fn format_used_percent(percent: u8) -> String {
    format!("{}% used", percent)
}

/// Returns "Resets in Xh Ym" relative to `now`. If past, returns "Resets now".
/// If more than 24 hours away, includes days.
pub fn format_reset_countdown(resets_at: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let total_seconds = (*resets_at - now).num_seconds();

    if total_seconds <= 0 {
        return "Resets now".to_string();
    }

    let total_minutes = total_seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 24 {
        let days = hours / 24;
        let remaining_hours = hours % 24;
        if remaining_hours == 0 {
            format!("Resets in {}d", days)
        } else {
            format!("Resets in {}d {}h", days, remaining_hours)
        }
    } else if hours > 0 {
        format!("Resets in {}h {}m", hours, minutes)
    } else {
        format!("Resets in {}m", total_minutes.max(1))
    }
}

fn format_clock(time: &DateTime<Local>) -> String {
    time.format("%-I:%M %p").to_string()
}

/// Returns "Resets Today at 5:30 PM", "Resets Tomorrow at 1:00 AM", or
/// "Resets on 31 Jan 2026 at 7:59 AM" for anything further out.
pub fn format_reset_datetime(resets_at: &DateTime<Utc>) -> String {
    let local_reset = resets_at.with_timezone(&Local);
    let today = Local::now().date_naive();
    let reset_date = local_reset.date_naive();

    if reset_date == today {
        format!("Resets Today at {}", format_clock(&local_reset))
    } else if reset_date == today + chrono::Duration::days(1) {
        format!("Resets Tomorrow at {}", format_clock(&local_reset))
    } else {
        format!(
            "Resets on {} at {}",
            local_reset.format("%-d %b %Y"),
            format_clock(&local_reset)
        )
    }
}

/// Returns "Updated at 3:04 PM".
pub fn format_updated_at(fetched_at: &DateTime<Utc>) -> String {
    format!("Updated at {}", format_clock(&fetched_at.with_timezone(&Local)))
}

/// Returns "[████░░░░░░░░]" where █ = used portion, ░ = remaining portion.
/// Width is the number of block characters inside the brackets.
pub fn format_usage_bar(percentage: f64, width: usize) -> String {
    let percentage = percentage.clamp(0.0, 1.0);
    let used_blocks = (percentage * width as f64).round() as usize;
    let remaining_blocks = width.saturating_sub(used_blocks);

    format!("[{}{}]", "█".repeat(used_blocks), "░".repeat(remaining_blocks))
}
