//! Nearest-timestamp join of weather context onto soil observations

use crate::models::{CuratedRecord, SensorObservation, WeatherContext};
use tracing::debug;

/// Maximum distance between a soil observation and the weather point
/// joined to it (1 hour)
pub const WEATHER_MATCH_TOLERANCE_MS: i64 = 60 * 60 * 1000;

/// Find the weather point closest to `timestamp_ms` within `tolerance_ms`.
///
/// `weather` must be sorted by timestamp. On an exact tie the earlier point
/// wins.
pub fn nearest_weather(
    timestamp_ms: i64,
    weather: &[WeatherContext],
    tolerance_ms: i64,
) -> Option<&WeatherContext> {
    let idx = weather.partition_point(|w| w.timestamp_ms < timestamp_ms);
    let before = idx.checked_sub(1).and_then(|i| weather.get(i));
    let after = weather.get(idx);

    let best = match (before, after) {
        (Some(b), Some(a)) => {
            if (timestamp_ms - b.timestamp_ms) <= (a.timestamp_ms - timestamp_ms) {
                b
            } else {
                a
            }
        }
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => return None,
    };

    ((best.timestamp_ms - timestamp_ms).abs() <= tolerance_ms).then_some(best)
}

/// Attach weather to every observation, falling back to the fixed defaults
/// where nothing lies within the tolerance window
pub fn join_weather(
    observations: &[SensorObservation],
    weather: &[WeatherContext],
) -> Vec<CuratedRecord> {
    let mut sorted = weather.to_vec();
    sorted.sort_by_key(|w| w.timestamp_ms);

    let mut matched = 0usize;
    let records: Vec<CuratedRecord> = observations
        .iter()
        .map(|obs| {
            match nearest_weather(obs.timestamp_ms, &sorted, WEATHER_MATCH_TOLERANCE_MS) {
                Some(w) => {
                    matched += 1;
                    CuratedRecord {
                        observation: *obs,
                        weather: *w,
                    }
                }
                None => CuratedRecord::without_weather(*obs),
            }
        })
        .collect();

    debug!(
        observations = observations.len(),
        weather_points = weather.len(),
        matched,
        "Weather context joined"
    );
    records
}
