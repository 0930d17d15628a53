//! Sensor data curation
//!
//! This module provides:
//! - Unit-tag interpretation of sensor store rows
//! - Cleaning, range validation and deduplication
//! - Nearest-timestamp weather join

mod curator;
mod readings;
mod weather_join;

pub use curator::{CuratedTable, CurationReport, DataCurator, MOISTURE_RANGE, PH_RANGE};
pub use readings::{
    group_readings, UNIT_IRRIGATION, UNIT_MOISTURE, UNIT_NUTRIENTS, UNIT_PH, UNIT_PHOSPHORUS,
    UNIT_POTASSIUM,
};
pub use weather_join::{join_weather, nearest_weather, WEATHER_MATCH_TOLERANCE_MS};
