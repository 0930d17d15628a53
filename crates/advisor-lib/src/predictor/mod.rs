//! Irrigation prediction serving

mod output;
mod service;
mod weather;

pub use output::{
    analyze_trend, confidence_interval, recommendations, OutputFormatter, RawOutputs, Z_95,
};
pub use service::{PredictionConfig, PredictionService, DEFAULT_HORIZON_HOURS};
pub use weather::{
    apply_forecast, heat_expected, rain_expected, HEAT_ALERT_ABOVE, RAIN_POSTPONE_ABOVE_MM,
    RAIN_PROBABILITY_FACTOR, REC_HEAT_PREEMPT, REC_RAIN_POSTPONE,
};
