//! Subcommand implementations

pub mod drift;
pub mod model;
pub mod predict;

use advisor_lib::sources::{NoWeather, StaticWeather, WeatherSource};
use advisor_lib::WeatherContext;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Read and parse a JSON input file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Weather history from a file, or none
pub fn weather_source(path: Option<&Path>) -> Result<Box<dyn WeatherSource>> {
    Ok(match path {
        Some(path) => {
            let points: Vec<WeatherContext> = read_json(path)?;
            Box::new(StaticWeather::new(points))
        }
        None => Box::new(NoWeather),
    })
}
