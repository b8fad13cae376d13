//! Forecast-to-state derivation.
//!
//! [`derive`] classifies a [`ForecastSnapshot`] at a given instant as clear,
//! rain soon, raining, or unknown, and converts interval offsets (minutes from
//! the snapshot anchor) into countdowns from `now`. It is pure and holds no
//! state between calls.

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;

use crate::model::{ForecastSnapshot, Interval, RAIN_KIND, Status, WeatherState};

/// Derive the current weather state from a snapshot.
///
/// Elapsed time since the anchor is truncated to whole minutes before it is
/// subtracted from interval bounds; countdowns are clamped at zero. A `now`
/// earlier than the anchor counts as zero elapsed minutes.
///
/// Intervals are scanned in order and the first match wins:
/// - the first precipitation interval containing `now` yields [`Status::Rain`];
/// - otherwise the first precipitation interval that has not started yet
///   yields [`Status::Soon`];
/// - otherwise the state is [`Status::Clear`].
pub fn derive(snapshot: &ForecastSnapshot, now: DateTime<Utc>) -> WeatherState {
    match snapshot.overall_kind.as_deref() {
        None => return WeatherState::idle(Status::Clear, snapshot.overall_phrase.clone()),
        Some(RAIN_KIND) => {}
        Some(other) => {
            return WeatherState::idle(Status::Unknown, format!("unknown cast type: {other}"));
        }
    }

    let anchor = snapshot.anchor_time;
    let elapsed = elapsed_minutes(anchor, now);
    let mut candidate: Option<&Interval> = None;

    for interval in snapshot.intervals.iter().filter(|i| i.is_precipitation()) {
        if is_raining_now(anchor, interval, now) {
            return WeatherState {
                status: Status::Rain,
                rain_start_minutes: 0,
                rain_end_minutes: countdown(interval.end_minute, elapsed),
                message: snapshot.overall_phrase.clone(),
            };
        }
        if candidate.is_none() && compare_to_offset(now, anchor, interval.start_minute).is_le() {
            candidate = Some(interval);
        }
    }

    match candidate {
        Some(next) => WeatherState {
            status: Status::Soon,
            rain_start_minutes: countdown(next.start_minute, elapsed),
            rain_end_minutes: countdown(next.end_minute, elapsed),
            message: snapshot.overall_phrase.clone(),
        },
        None => WeatherState::idle(Status::Clear, snapshot.overall_phrase.clone()),
    }
}

/// Whether `now` lies strictly inside the interval; both bounds are excluded.
pub fn is_raining_now(anchor: DateTime<Utc>, interval: &Interval, now: DateTime<Utc>) -> bool {
    compare_to_offset(now, anchor, interval.start_minute).is_gt()
        && compare_to_offset(now, anchor, interval.end_minute).is_lt()
}

/// Whole minutes between `anchor` and `now`, truncated toward zero, never negative.
pub fn elapsed_minutes(anchor: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - anchor).num_minutes().max(0)
}

/// Orders `now` against `anchor + minutes`.
///
/// Offsets that leave chrono's representable range lie beyond any `now`: far
/// future for positive offsets, far past for negative ones.
fn compare_to_offset(now: DateTime<Utc>, anchor: DateTime<Utc>, minutes: i64) -> Ordering {
    match Duration::try_minutes(minutes).and_then(|d| anchor.checked_add_signed(d)) {
        Some(bound) => now.cmp(&bound),
        None if minutes > 0 => Ordering::Less,
        None => Ordering::Greater,
    }
}

fn countdown(bound: i64, elapsed: i64) -> u32 {
    u32::try_from(bound.saturating_sub(elapsed).max(0)).unwrap_or(u32::MAX)
}
