//! Forecast-based adjustments applied on top of a model prediction

use crate::models::{ForecastPoint, Prediction};
use tracing::debug;

/// Forecast rain (mm) above which irrigation is postponed
pub const RAIN_POSTPONE_ABOVE_MM: f64 = 2.0;
/// Number of upcoming forecast points checked for rain
pub const RAIN_LOOKAHEAD_POINTS: usize = 2;
/// Fixed damping applied to the irrigation probability when rain is coming
pub const RAIN_PROBABILITY_FACTOR: f64 = 0.3;
/// Forecast temperature (°C) above which pre-emptive irrigation is suggested
pub const HEAT_ALERT_ABOVE: f64 = 35.0;
pub const HEAT_LOOKAHEAD_POINTS: usize = 4;

pub const REC_RAIN_POSTPONE: &str = "Rain forecast - postpone irrigation";
pub const REC_HEAT_PREEMPT: &str = "High temperature forecast - consider pre-emptive irrigation";

/// Whether any of the next forecast points brings significant rain
pub fn rain_expected(forecast: &[ForecastPoint]) -> bool {
    forecast
        .iter()
        .take(RAIN_LOOKAHEAD_POINTS)
        .any(|p| p.precipitation > RAIN_POSTPONE_ABOVE_MM)
}

pub fn heat_expected(forecast: &[ForecastPoint]) -> bool {
    forecast
        .iter()
        .take(HEAT_LOOKAHEAD_POINTS)
        .map(|p| p.temperature)
        .fold(f64::NEG_INFINITY, f64::max)
        > HEAT_ALERT_ABOVE
}

/// Apply rain and heat rules in place.
///
/// Rain only overrides a positive decision. Heat never changes the
/// decision; its note ends up first in the list.
pub fn apply_forecast(prediction: &mut Prediction, forecast: &[ForecastPoint]) {
    if forecast.is_empty() || prediction.is_degraded() {
        return;
    }

    if prediction.irrigation_needed && rain_expected(forecast) {
        debug!(
            probability = prediction.irrigation_probability,
            "Rain forecast overrides irrigation decision"
        );
        prediction.irrigation_needed = false;
        prediction.irrigation_probability *= RAIN_PROBABILITY_FACTOR;
        prediction
            .recommendations
            .insert(0, REC_RAIN_POSTPONE.to_string());
    }

    if heat_expected(forecast) {
        prediction
            .recommendations
            .insert(0, REC_HEAT_PREEMPT.to_string());
    }
}
