//! Prediction output formatting and post-processing
//!
//! Turns raw ensemble outputs into a `Prediction`: decision, ensemble
//! confidence interval, trend analysis and the recommendation list.

use crate::features::{moisture_status, nutrient_status, ph_status};
use crate::models::{
    ConfidenceInterval, NutrientStatus, PhStatus, Prediction, SensorObservation, TrendAnalysis,
};

/// z-value of a two-sided 95% interval
pub const Z_95: f64 = 1.96;

pub const REC_IRRIGATE_PH_IDEAL: &str = "Irrigation recommended - pH is ideal for nutrient uptake";
pub const REC_IRRIGATE_FIX_PH: &str = "Irrigation needed, but correct soil pH first";
pub const REC_NO_IRRIGATION: &str = "Irrigation not needed at the moment";
pub const REC_LIME: &str = "Apply lime to correct soil acidity";
pub const REC_ORGANIC_MATTER: &str = "Apply organic matter to lower soil pH";
pub const REC_PHOSPHORUS: &str = "Apply phosphorus-rich fertilizer";
pub const REC_POTASSIUM: &str = "Apply potassium-rich fertilizer";
pub const REC_MORNING_WINDOW: &str = "Ideal irrigation window (morning)";
pub const REC_AFTERNOON_WINDOW: &str = "Suitable irrigation window (late afternoon)";
pub const REC_AVOID_HEAT: &str = "Avoid irrigating - hottest period of the day";

/// Raw outputs of one ensemble query
#[derive(Debug, Clone)]
pub struct RawOutputs {
    /// Mean positive-class probability of the ensemble
    pub probability: f64,
    /// Positive-class probability of each member
    pub member_probabilities: Vec<f64>,
    pub humidity: f64,
}

/// 95% interval over member votes, clamped to [0, 1].
///
/// Uses the population standard deviation of the members.
pub fn confidence_interval(members: &[f64]) -> ConfidenceInterval {
    if members.is_empty() {
        return ConfidenceInterval::default();
    }
    let n = members.len() as f64;
    let mean = (members.iter().sum::<f64>() / n).clamp(0.0, 1.0);
    let std_dev = (members.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n).sqrt();
    ConfidenceInterval {
        lower: (mean - Z_95 * std_dev).max(0.0),
        mean,
        upper: (mean + Z_95 * std_dev).min(1.0),
        std_dev,
    }
}

pub fn analyze_trend(observation: &SensorObservation) -> TrendAnalysis {
    TrendAnalysis {
        humidity_status: moisture_status(observation.moisture),
        ph_status: ph_status(observation.ph),
        nutrient_status: nutrient_status(observation.phosphorus, observation.potassium),
    }
}

/// Ordered recommendation list for a decision, soil state and local hour
pub fn recommendations(
    irrigation_needed: bool,
    trend: &TrendAnalysis,
    observation: &SensorObservation,
    local_hour: u32,
) -> Vec<String> {
    let mut out = Vec::new();

    out.push(match (irrigation_needed, trend.ph_status) {
        (true, PhStatus::Ideal) => REC_IRRIGATE_PH_IDEAL,
        (true, _) => REC_IRRIGATE_FIX_PH,
        (false, _) => REC_NO_IRRIGATION,
    });

    match trend.ph_status {
        PhStatus::Acidic => out.push(REC_LIME),
        PhStatus::Alkaline => out.push(REC_ORGANIC_MATTER),
        PhStatus::Ideal => {}
    }

    if trend.nutrient_status == NutrientStatus::Deficient {
        if !observation.phosphorus {
            out.push(REC_PHOSPHORUS);
        }
        if !observation.potassium {
            out.push(REC_POTASSIUM);
        }
    }

    match local_hour {
        6..=10 => out.push(REC_MORNING_WINDOW),
        11..=15 => out.push(REC_AVOID_HEAT),
        16..=18 => out.push(REC_AFTERNOON_WINDOW),
        _ => {}
    }

    out.into_iter().map(str::to_string).collect()
}

/// Formats raw ensemble outputs into a `Prediction`
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormatter;

impl OutputFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(
        &self,
        raw: &RawOutputs,
        observation: &SensorObservation,
        horizon_hours: u32,
        local_hour: u32,
        model_version: &str,
    ) -> Prediction {
        let probability = raw.probability.clamp(0.0, 1.0);
        let irrigation_needed = probability > 0.5;
        let trend = analyze_trend(observation);

        Prediction {
            irrigation_needed,
            irrigation_probability: probability,
            confidence: probability.max(1.0 - probability),
            confidence_interval: confidence_interval(&raw.member_probabilities),
            predicted_humidity: raw.humidity,
            current_humidity: observation.moisture,
            recommendations: recommendations(irrigation_needed, &trend, observation, local_hour),
            trend: Some(trend),
            horizon_hours,
            model_version: Some(model_version.to_string()),
            generated_at: chrono::Utc::now().timestamp(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MoistureStatus;

    fn observation(moisture: f64, ph: f64, phosphorus: bool, potassium: bool) -> SensorObservation {
        SensorObservation {
            timestamp_ms: 0,
            moisture,
            ph,
            phosphorus,
            potassium,
            irrigation: false,
        }
    }

    #[test]
    fn test_interval_is_clamped_and_ordered() {
        let ci = confidence_interval(&[0.0, 1.0, 1.0, 1.0, 0.0, 1.0]);
        assert!(ci.lower >= 0.0 && ci.upper <= 1.0);
        assert!(ci.lower <= ci.mean && ci.mean <= ci.upper);
        assert_eq!(ci.upper, 1.0);
    }

    #[test]
    fn test_unanimous_members_collapse_interval() {
        let ci = confidence_interval(&[0.8; 10]);
        assert!((ci.lower - 0.8).abs() < 1e-12);
        assert!((ci.upper - 0.8).abs() < 1e-12);
        assert_eq!(ci.std_dev, 0.0);
    }

    #[test]
    fn test_population_std() {
        let ci = confidence_interval(&[0.4, 0.6]);
        assert!((ci.std_dev - 0.1).abs() < 1e-12);
        assert!((ci.lower - (0.5 - 0.196)).abs() < 1e-12);
    }

    #[test]
    fn test_recommendation_order() {
        let obs = observation(20.0, 5.5, false, true);
        let trend = analyze_trend(&obs);
        assert_eq!(trend.humidity_status, MoistureStatus::Low);
        let recs = recommendations(true, &trend, &obs, 7);
        assert_eq!(
            recs,
            vec![REC_IRRIGATE_FIX_PH, REC_LIME, REC_PHOSPHORUS, REC_MORNING_WINDOW]
        );
    }

    #[test]
    fn test_no_irrigation_at_noon() {
        let obs = observation(80.0, 6.8, true, true);
        let recs = recommendations(false, &analyze_trend(&obs), &obs, 13);
        assert_eq!(recs, vec![REC_NO_IRRIGATION, REC_AVOID_HEAT]);
    }

    #[test]
    fn test_night_has_no_timing_note() {
        let obs = observation(50.0, 8.0, false, false);
        let recs = recommendations(false, &analyze_trend(&obs), &obs, 2);
        assert_eq!(
            recs,
            vec![
                REC_NO_IRRIGATION,
                REC_ORGANIC_MATTER,
                REC_PHOSPHORUS,
                REC_POTASSIUM
            ]
        );
    }

    #[test]
    fn test_format_confidence_is_max_class_probability() {
        let raw = RawOutputs {
            probability: 0.3,
            member_probabilities: vec![0.2, 0.4],
            humidity: 41.0,
        };
        let p = OutputFormatter::new().format(&raw, &observation(50.0, 6.5, true, true), 4, 17, "v1");
        assert!(!p.irrigation_needed);
        assert!((p.confidence - 0.7).abs() < 1e-12);
        assert_eq!(p.predicted_humidity, 41.0);
        assert_eq!(p.recommendations.last().map(String::as_str), Some(REC_AFTERNOON_WINDOW));
    }
}
