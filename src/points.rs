//! Point configuration
//!
//! Loads the weather points and air-quality stations the aggregation
//! endpoints cover, either from the built-in defaults or from a JSON file.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::Result;
use crate::error::PoseidonError;
use crate::models::GeoPoint;

/// The two point lists served by the aggregation endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointSets {
    #[serde(default = "default_weather_points")]
    pub weather: Vec<GeoPoint>,
    #[serde(default = "default_air_stations")]
    pub air_quality: Vec<GeoPoint>,
}

impl Default for PointSets {
    fn default() -> Self {
        Self {
            weather: default_weather_points(),
            air_quality: default_air_stations(),
        }
    }
}

impl PointSets {
    /// Load point lists from a JSON file, validating both.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading point configuration from {}", path.display());

        let raw = std::fs::read_to_string(path)?;
        let sets: PointSets = serde_json::from_str(&raw).map_err(|e| {
            PoseidonError::config(format!("Malformed point file {}: {e}", path.display()))
        })?;
        sets.validate()?;

        info!(
            "Loaded {} weather points and {} air-quality stations from {}",
            sets.weather.len(),
            sets.air_quality.len(),
            path.display()
        );
        Ok(sets)
    }

    /// Built-in defaults, or the file at `path` when one is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate(&self.weather)?;
        validate(&self.air_quality)
    }
}

/// Check that a point list is usable for aggregation.
///
/// The list must be non-empty, every point must have a name and in-range
/// coordinates, and names must be unique.
pub fn validate(points: &[GeoPoint]) -> Result<()> {
    if points.is_empty() {
        return Err(PoseidonError::config("Point list is empty"));
    }

    let mut seen = HashSet::new();
    for point in points {
        if point.name.trim().is_empty() {
            return Err(PoseidonError::config("Point without a name"));
        }
        if !point.has_valid_coordinates() {
            return Err(PoseidonError::config(format!(
                "Point {} has invalid coordinates ({})",
                point.name,
                point.format_coordinates()
            )));
        }
        if !seen.insert(point.name.as_str()) {
            return Err(PoseidonError::config(format!(
                "Duplicate point name {}",
                point.name
            )));
        }
    }
    Ok(())
}

/// Major cities with their nearest ground-observation station
#[must_use]
pub fn default_weather_points() -> Vec<GeoPoint> {
    [
        ("Seoul", 37.5665, 126.9780, "108"),
        ("Busan", 35.1796, 129.0756, "159"),
        ("Daegu", 35.8714, 128.6014, "143"),
        ("Incheon", 37.4563, 126.7052, "112"),
        ("Gwangju", 35.1595, 126.8526, "156"),
        ("Daejeon", 36.3504, 127.3845, "133"),
        ("Ulsan", 35.5384, 129.3114, "152"),
        ("Sejong", 36.4800, 127.2890, "129"),
        ("Jeonju", 35.8242, 127.1480, "146"),
    ]
    .into_iter()
    .map(|(name, lat, lon, station)| GeoPoint::new(name, lat, lon).with_station(station))
    .collect()
}

/// Major cities with their representative air-quality station
#[must_use]
pub fn default_air_stations() -> Vec<GeoPoint> {
    [
        ("Seoul", 37.5665, 126.9780, "종로구"),
        ("Busan", 35.1796, 129.0756, "부산"),
        ("Daegu", 35.8714, 128.6014, "대구"),
        ("Incheon", 37.4563, 126.7052, "인천"),
        ("Gwangju", 35.1595, 126.8526, "광주"),
        ("Daejeon", 36.3504, 127.3845, "대전"),
        ("Ulsan", 35.5384, 129.3114, "울산"),
        ("Sejong", 36.4800, 127.2890, "세종"),
    ]
    .into_iter()
    .map(|(name, lat, lon, station)| GeoPoint::new(name, lat, lon).with_air_station(station))
    .collect()
}
