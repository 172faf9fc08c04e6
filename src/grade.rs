//! Fixed-threshold severity classification.
//!
//! A concentration equal to a breakpoint still belongs to the lower grade.
//! The same tables classify live and synthetic readings.

use serde::{Deserialize, Serialize};

/// Pollutants reported by the air-quality provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    /// Particulate matter ≤10 µm (µg/m³)
    Pm10,
    /// Particulate matter ≤2.5 µm (µg/m³)
    Pm25,
    /// Ozone (ppm)
    O3,
    /// Nitrogen dioxide (ppm)
    No2,
    /// Carbon monoxide (ppm)
    Co,
    /// Sulfur dioxide (ppm)
    So2,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm10,
        Pollutant::Pm25,
        Pollutant::O3,
        Pollutant::No2,
        Pollutant::Co,
        Pollutant::So2,
    ];

    /// Upper bounds of grades 1, 2 and 3
    #[must_use]
    pub fn breakpoints(self) -> [f64; 3] {
        match self {
            Pollutant::Pm10 => [30.0, 80.0, 150.0],
            Pollutant::Pm25 => [15.0, 35.0, 75.0],
            Pollutant::O3 => [0.030, 0.090, 0.150],
            Pollutant::No2 => [0.030, 0.060, 0.200],
            Pollutant::Co => [2.0, 9.0, 15.0],
            Pollutant::So2 => [0.020, 0.050, 0.150],
        }
    }
}

/// Ordinal air-quality grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Grade {
    Good = 1,
    Moderate = 2,
    Unhealthy = 3,
    VeryUnhealthy = 4,
}

impl Grade {
    #[must_use]
    pub fn level(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Grade::Good => "good",
            Grade::Moderate => "moderate",
            Grade::Unhealthy => "unhealthy",
            Grade::VeryUnhealthy => "very-unhealthy",
        }
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> Self {
        grade.level()
    }
}

impl TryFrom<u8> for Grade {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Grade::Good),
            2 => Ok(Grade::Moderate),
            3 => Ok(Grade::Unhealthy),
            4 => Ok(Grade::VeryUnhealthy),
            other => Err(format!("grade out of range: {other}")),
        }
    }
}

/// Classify a concentration. Negative or non-finite inputs have no grade.
#[must_use]
pub fn classify(pollutant: Pollutant, concentration: f64) -> Option<Grade> {
    if !concentration.is_finite() || concentration < 0.0 {
        return None;
    }
    let [good, moderate, unhealthy] = pollutant.breakpoints();
    let grade = if concentration <= good {
        Grade::Good
    } else if concentration <= moderate {
        Grade::Moderate
    } else if concentration <= unhealthy {
        Grade::Unhealthy
    } else {
        Grade::VeryUnhealthy
    };
    Some(grade)
}

/// Hourly rainfall intensity shown on precipitation markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RainfallLevel {
    None,
    Light,
    Caution,
    Warning,
    Danger,
}

impl RainfallLevel {
    #[must_use]
    pub fn classify(millimetres_per_hour: f64) -> Self {
        match millimetres_per_hour {
            mm if mm >= 20.0 => RainfallLevel::Danger,
            mm if mm >= 10.0 => RainfallLevel::Warning,
            mm if mm >= 5.0 => RainfallLevel::Caution,
            mm if mm > 0.0 => RainfallLevel::Light,
            _ => RainfallLevel::None,
        }
    }
}
