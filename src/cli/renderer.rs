use chrono::{DateTime, Utc};
use colored::{control, ColoredString, Colorize};

use crate::core::formatter::{
    format_reset_countdown, format_reset_datetime, format_updated_at, format_usage_bar,
    format_used_percent, UsageLevel,
};
use crate::core::models::usage::{UsagePeriod, UsageSnapshot};
use crate::core::notifier::{alert_message, ALERT_TITLE};

const BAR_WIDTH: usize = 12;

#[derive(Clone, Copy)]
enum ResetStyle {
    Countdown,
    DateTime,
}

/// Render the snapshot as a colored (or plain) block.
///
/// Layout:
/// ```text
///  Claude usage
///   Session   82% used [██████████░░]
///             Resets in 4h 59m
///   Weekly    41% used [█████░░░░░░░]
///             Resets Tomorrow at 1:00 AM
///   Sonnet    12% used [█░░░░░░░░░░░]
///   Updated at 3:04 PM
/// ```
pub fn render_snapshot(snapshot: &UsageSnapshot, use_color: bool, now: DateTime<Utc>) -> String {
    control::set_override(use_color);

    let mut lines: Vec<String> = Vec::new();
    lines.push(" Claude usage".bold().to_string());

    if snapshot.has_data() {
        render_period(&mut lines, "Session", &snapshot.session, ResetStyle::Countdown, now);
        render_period(&mut lines, "Weekly", &snapshot.weekly, ResetStyle::DateTime, now);
        if let Some(secondary) = snapshot.secondary() {
            render_period(&mut lines, "Sonnet", secondary, ResetStyle::DateTime, now);
        }
    } else {
        lines.push(format!("  {}", "No usage data yet".dimmed()));
    }

    if let Some(fetched_at) = &snapshot.fetched_at {
        lines.push(format!("  {}", format_updated_at(fetched_at).dimmed()));
    }

    if let Some(err) = &snapshot.last_error {
        lines.push(format!("  {}     {}", "Error".cyan(), err.red()));
    }

    lines.join("\n")
}

fn render_period(
    lines: &mut Vec<String>,
    label: &str,
    period: &UsagePeriod,
    style: ResetStyle,
    now: DateTime<Utc>,
) {
    let percent_str = format_used_percent(period.percent());
    let bar_str = format_usage_bar(period.percentage(), BAR_WIDTH);
    let level = UsageLevel::from_fraction(period.percentage());

    lines.push(format!(
        "  {}  {} {}",
        format!("{:<7}", label).cyan(),
        color_by_level(level, &percent_str),
        color_by_level(level, &bar_str)
    ));

    if let Some(resets_at) = &period.resets_at {
        let reset_line = match style {
            ResetStyle::Countdown => format_reset_countdown(resets_at, now),
            ResetStyle::DateTime => format_reset_datetime(resets_at),
        };
        // 11 spaces to align under the percent/bar values
        lines.push(format!("           {}", reset_line.dimmed()));
    }
}

fn color_by_level(level: UsageLevel, text: &str) -> ColoredString {
    match level {
        UsageLevel::Normal => text.green(),
        UsageLevel::Warning => text.yellow(),
        UsageLevel::Critical => text.red(),
    }
}

/// Two-line alert text: title, then message.
pub fn render_alert(percentage: u8, use_color: bool) -> String {
    control::set_override(use_color);
    format!(
        "{}\n  {}",
        ALERT_TITLE.bold().yellow(),
        alert_message(percentage)
    )
}
