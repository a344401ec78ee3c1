use chrono::NaiveDate;

/// Formats a second count the way session durations are reported in logs and
/// alert messages.
pub fn format_seconds(seconds: f64) -> String {
    let total = seconds.max(0.) as i64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Calendar-date key used by the notification ledger.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
