use chrono::{DateTime, TimeDelta, Utc};

/// End of the window `[start, start + duration)`, or `None` when it lies
/// beyond the calendar range.
pub fn window_end(start: DateTime<Utc>, duration: TimeDelta) -> Option<DateTime<Utc>> {
    start.checked_add_signed(duration)
}

/// Whether `now` falls inside the half-open window `[start, start + duration)`.
///
/// Zero and negative durations are never active.
pub fn is_active(now: DateTime<Utc>, start: DateTime<Utc>, duration: TimeDelta) -> bool {
    if duration <= TimeDelta::zero() || now < start {
        return false;
    }
    match window_end(start, duration) {
        Some(end) => now < end,
        None => true,
    }
}
