//! Synthetic fallback readings.
//!
//! When no live source answers for a point, a stand-in reading is derived
//! from a per-region baseline, perturbed by a bounded random factor and then
//! graded with the same thresholds as live data. The baselines sit behind
//! [`BaselineTable`] so historical values can replace the sample table.

use rand::RngExt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::grade::RainfallLevel;
use crate::models::{
    AirQualitySnapshot, Concentrations, GeoPoint, GridNowcast, Reading, ReadingData,
};
use crate::time_window::{self, ProductType};
use chrono::{DateTime, Utc};

/// Lower bound of the perturbation factor
pub const MIN_FACTOR: f64 = 0.8;
/// Upper bound of the perturbation factor
pub const MAX_FACTOR: f64 = 1.2;

/// Typical values for a region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionBaseline {
    pub pm10: f64,
    pub pm25: f64,
    pub o3: f64,
    pub no2: f64,
    pub co: f64,
    pub so2: f64,
    pub temperature_c: f64,
    pub precipitation_mm: f64,
    pub humidity_pct: f64,
}

impl RegionBaseline {
    const fn sample(pm10: f64, pm25: f64, temperature_c: f64) -> Self {
        Self {
            pm10,
            pm25,
            o3: 0.032,
            no2: 0.021,
            co: 0.5,
            so2: 0.003,
            temperature_c,
            precipitation_mm: 0.0,
            humidity_pct: 60.0,
        }
    }
}

/// Lookup of baseline values by region name
pub trait BaselineTable: Send + Sync {
    fn baseline(&self, region: &str) -> RegionBaseline;
}

/// Hard-coded sample baselines for the default cities
#[derive(Debug, Clone)]
pub struct StaticBaselines {
    regions: HashMap<String, RegionBaseline>,
    fallback: RegionBaseline,
}

impl StaticBaselines {
    #[must_use]
    pub fn new(regions: HashMap<String, RegionBaseline>, fallback: RegionBaseline) -> Self {
        Self { regions, fallback }
    }
}

impl Default for StaticBaselines {
    fn default() -> Self {
        let regions = [
            ("Seoul", RegionBaseline::sample(45.0, 22.0, 13.0)),
            ("Busan", RegionBaseline::sample(38.0, 18.0, 15.5)),
            ("Daegu", RegionBaseline::sample(42.0, 20.0, 14.5)),
            ("Incheon", RegionBaseline::sample(48.0, 24.0, 12.5)),
            ("Gwangju", RegionBaseline::sample(35.0, 17.0, 14.0)),
            ("Daejeon", RegionBaseline::sample(37.0, 19.0, 13.5)),
            ("Ulsan", RegionBaseline::sample(40.0, 19.0, 15.0)),
            ("Sejong", RegionBaseline::sample(36.0, 18.0, 13.0)),
            ("Jeonju", RegionBaseline::sample(39.0, 20.0, 14.0)),
        ]
        .into_iter()
        .map(|(name, baseline)| (name.to_string(), baseline))
        .collect();

        Self::new(regions, RegionBaseline::sample(40.0, 20.0, 14.0))
    }
}

impl BaselineTable for StaticBaselines {
    fn baseline(&self, region: &str) -> RegionBaseline {
        self.regions
            .get(region)
            .or_else(|| {
                // "Seoul Jongno" style names fall back to their city prefix
                self.regions
                    .iter()
                    .find(|(name, _)| region.starts_with(name.as_str()))
                    .map(|(_, baseline)| baseline)
            })
            .copied()
            .unwrap_or(self.fallback)
    }
}

/// Which kind of stand-in reading to manufacture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticKind {
    Weather,
    AirQuality,
}

/// Manufactures flagged stand-in readings
#[derive(Clone)]
pub struct SyntheticGenerator {
    kind: SyntheticKind,
    baselines: Arc<dyn BaselineTable>,
}

impl SyntheticGenerator {
    #[must_use]
    pub fn new(kind: SyntheticKind, baselines: Arc<dyn BaselineTable>) -> Self {
        Self { kind, baselines }
    }

    #[must_use]
    pub fn kind(&self) -> SyntheticKind {
        self.kind
    }

    /// Produce a synthetic reading for `point` at `now`.
    #[must_use]
    pub fn reading(&self, point: &GeoPoint, now: DateTime<Utc>) -> Reading {
        let baseline = self.baselines.baseline(&point.name);
        let data = match self.kind {
            SyntheticKind::Weather => weather(point, &baseline, now),
            SyntheticKind::AirQuality => air_quality(point, &baseline),
        };
        Reading::synthetic(data)
    }
}

fn perturb(value: f64) -> f64 {
    let factor: f64 = rand::rng().random_range(MIN_FACTOR..=MAX_FACTOR);
    value * factor
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

fn weather(point: &GeoPoint, baseline: &RegionBaseline, now: DateTime<Utc>) -> ReadingData {
    let precipitation_mm = round_to(perturb(baseline.precipitation_mm), 1);
    ReadingData::GridNowcast(GridNowcast {
        window: time_window::resolve_at(ProductType::ShortRangeNowcast, now),
        grid: point.grid(),
        precipitation_mm,
        precipitation_type: u8::from(precipitation_mm > 0.0),
        temperature_c: round_to(perturb(baseline.temperature_c), 1),
        humidity_pct: Some(round_to(perturb(baseline.humidity_pct).min(100.0), 0)),
        wind_speed_ms: None,
        rainfall_level: RainfallLevel::classify(precipitation_mm),
    })
}

fn air_quality(point: &GeoPoint, baseline: &RegionBaseline) -> ReadingData {
    let concentrations = Concentrations {
        pm10: Some(perturb(baseline.pm10).round()),
        pm25: Some(perturb(baseline.pm25).round()),
        o3: Some(round_to(perturb(baseline.o3), 3)),
        no2: Some(round_to(perturb(baseline.no2), 3)),
        co: Some(round_to(perturb(baseline.co), 1)),
        so2: Some(round_to(perturb(baseline.so2), 3)),
    };
    let station = point
        .air_station
        .clone()
        .unwrap_or_else(|| point.name.clone());
    ReadingData::AirQualitySnapshot(AirQualitySnapshot::new(station, None, concentrations, None))
}
