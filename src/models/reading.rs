//! Normalized readings produced by the source adapters

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::GeoPoint;
use crate::grade::{self, Grade, Pollutant, RainfallLevel};
use crate::grid::GridCoordinate;
use crate::time_window::{ProductType, TimeWindow};

/// Which upstream (or the synthetic generator) produced a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceLabel {
    /// Ground-station hourly observation
    Asos,
    /// Ultra-short-range nowcast grid
    GridNowcast,
    /// Ultra-short-range forecast grid
    GridForecast,
    /// Village forecast grid
    VillageForecast,
    /// Air-quality station measurement
    AirKorea,
    /// Manufactured fallback
    Synthetic,
}

impl SourceLabel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceLabel::Asos => "asos",
            SourceLabel::GridNowcast => "grid-nowcast",
            SourceLabel::GridForecast => "grid-forecast",
            SourceLabel::VillageForecast => "village-forecast",
            SourceLabel::AirKorea => "air-korea",
            SourceLabel::Synthetic => "synthetic",
        }
    }
}

/// A normalized reading with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub source_label: SourceLabel,
    pub is_synthetic: bool,
    #[serde(flatten)]
    pub data: ReadingData,
}

impl Reading {
    /// A reading that came from a live upstream
    #[must_use]
    pub fn live(source_label: SourceLabel, data: ReadingData) -> Self {
        Self {
            source_label,
            is_synthetic: false,
            data,
        }
    }

    /// A manufactured stand-in reading
    #[must_use]
    pub fn synthetic(data: ReadingData) -> Self {
        Self {
            source_label: SourceLabel::Synthetic,
            is_synthetic: true,
            data,
        }
    }
}

/// Per-kind field sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReadingData {
    GroundObservation(GroundObservation),
    GridNowcast(GridNowcast),
    GridForecastSeries(GridForecastSeries),
    AirQualitySnapshot(AirQualitySnapshot),
}

/// Hourly observation measured at a ground station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundObservation {
    pub observation_station: String,
    /// Observation time as reported (`YYYY-MM-DD HH:MM`)
    pub observed_at: Option<String>,
    pub precipitation_mm: f64,
    /// Precipitation type code (0 none, 1 rain, ...)
    pub precipitation_type: u8,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_ms: f64,
    pub rainfall_level: RainfallLevel,
}

/// Nowcast values for one grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridNowcast {
    pub window: TimeWindow,
    pub grid: GridCoordinate,
    pub precipitation_mm: f64,
    pub precipitation_type: u8,
    pub temperature_c: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed_ms: Option<f64>,
    pub rainfall_level: RainfallLevel,
}

/// One forecast time step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastSlot {
    pub forecast_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precipitation_mm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precipitation_type: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    /// Probability of precipitation (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pop: Option<u8>,
    /// Precipitation amount (mm)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pcp: Option<f64>,
}

impl ForecastSlot {
    #[must_use]
    pub fn empty(forecast_at: NaiveDateTime) -> Self {
        Self {
            forecast_at,
            precipitation_mm: None,
            precipitation_type: None,
            temperature_c: None,
            pop: None,
            pcp: None,
        }
    }
}

/// Forecast time series for one grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridForecastSeries {
    pub product: ProductType,
    pub window: TimeWindow,
    pub grid: GridCoordinate,
    pub series: Vec<ForecastSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_pop: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_pcp: Option<f64>,
}

/// Pollutant concentrations; missing values stay `None`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concentrations {
    pub pm10: Option<f64>,
    pub pm25: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub co: Option<f64>,
    pub so2: Option<f64>,
}

impl Concentrations {
    #[must_use]
    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        match pollutant {
            Pollutant::Pm10 => self.pm10,
            Pollutant::Pm25 => self.pm25,
            Pollutant::O3 => self.o3,
            Pollutant::No2 => self.no2,
            Pollutant::Co => self.co,
            Pollutant::So2 => self.so2,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        Pollutant::ALL.iter().all(|p| self.get(*p).is_none())
    }
}

/// Latest measurement at an air-quality station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirQualitySnapshot {
    pub station_name: String,
    pub measured_at: Option<String>,
    #[serde(flatten)]
    pub concentrations: Concentrations,
    /// Integrated air-quality index as reported upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub khai_value: Option<f64>,
    pub grades: BTreeMap<Pollutant, Grade>,
    /// Worst pollutant grade
    pub overall_grade: Option<Grade>,
}

impl AirQualitySnapshot {
    /// Build a snapshot, grading every available concentration.
    #[must_use]
    pub fn new(
        station_name: impl Into<String>,
        measured_at: Option<String>,
        concentrations: Concentrations,
        khai_value: Option<f64>,
    ) -> Self {
        let grades: BTreeMap<Pollutant, Grade> = Pollutant::ALL
            .iter()
            .filter_map(|&p| {
                concentrations
                    .get(p)
                    .and_then(|value| grade::classify(p, value))
                    .map(|g| (p, g))
            })
            .collect();
        let overall_grade = grades.values().copied().max();

        Self {
            station_name: station_name.into(),
            measured_at,
            concentrations,
            khai_value,
            grades,
            overall_grade,
        }
    }
}

/// One configured point with the reading it resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointReading {
    pub point: GeoPoint,
    pub reading: Reading,
}

/// Every configured point in order, plus per-source counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResult {
    pub points: Vec<PointReading>,
    pub sources: BTreeMap<SourceLabel, usize>,
    pub schema_failures: usize,
}

impl AggregatedResult {
    #[must_use]
    pub fn new(points: Vec<PointReading>, schema_failures: usize) -> Self {
        let mut sources = BTreeMap::new();
        for entry in &points {
            *sources.entry(entry.reading.source_label).or_insert(0) += 1;
        }
        Self {
            points,
            sources,
            schema_failures,
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn synthetic_count(&self) -> usize {
        self.points
            .iter()
            .filter(|p| p.reading.is_synthetic)
            .count()
    }

    #[must_use]
    pub fn any_synthetic(&self) -> bool {
        self.synthetic_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pm10: f64, pm25: f64) -> AirQualitySnapshot {
        AirQualitySnapshot::new(
            "Jongno-gu",
            Some("2024-01-01 15:00".into()),
            Concentrations {
                pm10: Some(pm10),
                pm25: Some(pm25),
                ..Concentrations::default()
            },
            None,
        )
    }

    #[test]
    fn test_snapshot_grades() {
        let snap = snapshot(45.0, 40.0);
        assert_eq!(snap.grades.get(&Pollutant::Pm10), Some(&Grade::Moderate));
        assert_eq!(snap.grades.get(&Pollutant::Pm25), Some(&Grade::Unhealthy));
        assert_eq!(snap.overall_grade, Some(Grade::Unhealthy));
        assert!(!snap.grades.contains_key(&Pollutant::O3));
    }

    #[test]
    fn test_empty_concentrations() {
        assert!(Concentrations::default().is_empty());
        let snap = AirQualitySnapshot::new("x", None, Concentrations::default(), None);
        assert_eq!(snap.overall_grade, None);
    }

    #[test]
    fn test_reading_serialization_shape() {
        let reading = Reading::synthetic(ReadingData::AirQualitySnapshot(snapshot(20.0, 10.0)));
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["sourceLabel"], "synthetic");
        assert_eq!(json["isSynthetic"], true);
        assert_eq!(json["kind"], "air-quality-snapshot");
        assert_eq!(json["pm10"], 20.0);
        assert_eq!(json["grades"]["pm10"], 1);
    }

    #[test]
    fn test_aggregated_counts() {
        let point = GeoPoint::new("Seoul", 37.5665, 126.978);
        let live = Reading::live(
            SourceLabel::AirKorea,
            ReadingData::AirQualitySnapshot(snapshot(20.0, 10.0)),
        );
        let fake = Reading::synthetic(ReadingData::AirQualitySnapshot(snapshot(90.0, 10.0)));
        let result = AggregatedResult::new(
            vec![
                PointReading { point: point.clone(), reading: live },
                PointReading { point: point.clone(), reading: fake.clone() },
                PointReading { point, reading: fake },
            ],
            1,
        );
        assert_eq!(result.count(), 3);
        assert_eq!(result.synthetic_count(), 2);
        assert_eq!(result.sources.get(&SourceLabel::AirKorea), Some(&1));
        assert_eq!(result.sources.get(&SourceLabel::Synthetic), Some(&2));
        assert!(result.any_synthetic());
    }
}
