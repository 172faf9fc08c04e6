//! Query location model

use serde::{Deserialize, Serialize};

use crate::grid::{self, GridCoordinate, TmCoordinate};

/// A statically configured query location (a city or observation site)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    /// Display name, also the key into the synthetic baseline table
    pub name: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Ground-observation station id, when one is nearby
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    /// Air-quality station name, when one is assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_station: Option<String>,
}

impl GeoPoint {
    /// Create a new point
    #[must_use]
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            station_id: None,
            air_station: None,
        }
    }

    #[must_use]
    pub fn with_station(mut self, station_id: impl Into<String>) -> Self {
        self.station_id = Some(station_id.into());
        self
    }

    #[must_use]
    pub fn with_air_station(mut self, station_name: impl Into<String>) -> Self {
        self.air_station = Some(station_name.into());
        self
    }

    /// Forecast grid cell for this point
    #[must_use]
    pub fn grid(&self) -> GridCoordinate {
        grid::to_grid(self.latitude, self.longitude)
    }

    /// Approximate TM coordinate for station lookup
    #[must_use]
    pub fn tm(&self) -> TmCoordinate {
        grid::to_tm(self.latitude, self.longitude)
    }

    /// Format location as coordinates string
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }

    /// Whether the coordinates are finite and inside WGS84 bounds
    #[must_use]
    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}
