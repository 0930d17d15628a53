//! Named feature vectors and the training-time column manifest

use serde::{Deserialize, Serialize};

/// Engineered feature columns, in the order they are produced
pub const FEATURE_COLUMNS: [&str; 23] = [
    "moisture",
    "ph",
    "phosphorus",
    "potassium",
    "temperature",
    "air_humidity",
    "precipitation",
    "wind_speed",
    "pressure",
    "hour_of_day",
    "day_of_week",
    "month",
    "moisture_trend",
    "ph_trend",
    "moisture_variation",
    "heat_stress",
    "temperature_trend",
    "recent_rain",
    "accumulated_precipitation",
    "period_of_day",
    "season",
    "nutrient_need",
    "ph_category",
];

/// Ordered list of named numeric fields
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(&'static str, f64)>,
}

impl FeatureVector {
    pub(crate) fn from_entries(entries: Vec<(&'static str, f64)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    /// Overwrite an existing field; false if the field is unknown
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => {
                entry.1 = value;
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered feature names a trained model expects.
///
/// Captured at training time and persisted with the artifact. Every vector
/// fed to the model is reindexed to it: columns are taken by name, in
/// manifest order, and columns the vector lacks become zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnManifest {
    columns: Vec<String>,
}

impl ColumnManifest {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn from_vector(vector: &FeatureVector) -> Self {
        Self::new(vector.names().map(str::to_string).collect())
    }

    /// Manifest of the current feature engineering
    pub fn standard() -> Self {
        Self::new(FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn reindex(&self, vector: &FeatureVector) -> Vec<f64> {
        self.columns
            .iter()
            .map(|c| vector.get(c).unwrap_or(0.0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector() -> FeatureVector {
        FeatureVector::from_entries(vec![("moisture", 40.0), ("ph", 6.5), ("season", 3.0)])
    }

    #[test]
    fn test_reindex_reorders_by_name() {
        let manifest = ColumnManifest::new(vec!["season".into(), "moisture".into()]);
        assert_eq!(manifest.reindex(&vector()), vec![3.0, 40.0]);
    }

    #[test]
    fn test_reindex_zero_fills_missing_columns() {
        let manifest = ColumnManifest::new(vec!["ph".into(), "legacy_column".into()]);
        assert_eq!(manifest.reindex(&vector()), vec![6.5, 0.0]);
    }

    #[test]
    fn test_set_only_touches_known_fields() {
        let mut v = vector();
        assert!(v.set("ph", 7.0));
        assert!(!v.set("unknown", 1.0));
        assert_eq!(v.get("ph"), Some(7.0));
        assert_eq!(v.len(), 3);
    }

    #[test]
    fn test_standard_manifest_matches_columns() {
        let manifest = ColumnManifest::standard();
        assert_eq!(manifest.len(), FEATURE_COLUMNS.len());
        assert_eq!(manifest.columns()[0], "moisture");
    }
}
