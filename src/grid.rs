//! Coordinate conversions into the providers' native grids.
//!
//! The forecast provider indexes its products on a 5 km Lambert Conformal
//! Conic grid (`nx`, `ny`). The air-quality provider looks stations up by a
//! planar TM coordinate; that conversion is a linear approximation centred on
//! 126.0°E / 37.0°N and is only good enough for nearest-station lookup, not
//! for distance computations.
//!
//! Neither conversion validates that the point lies inside Korea.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Earth radius in km
const EARTH_RADIUS_KM: f64 = 6371.00877;
/// Grid spacing in km
const GRID_SPACING_KM: f64 = 5.0;
const STANDARD_PARALLEL_1: f64 = 30.0;
const STANDARD_PARALLEL_2: f64 = 60.0;
const ORIGIN_LON: f64 = 126.0;
const ORIGIN_LAT: f64 = 38.0;
const ORIGIN_X: f64 = 43.0;
const ORIGIN_Y: f64 = 136.0;

const TM_CENTER_LON: f64 = 126.0;
const TM_CENTER_LAT: f64 = 37.0;
const TM_SCALE: f64 = 200_000.0;
const TM_OFFSET_X: f64 = 200_000.0;
const TM_OFFSET_Y: f64 = 500_000.0;

const DEG_TO_RAD: f64 = PI / 180.0;

/// Cell of the forecast provider's Lambert grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCoordinate {
    pub nx: i32,
    pub ny: i32,
}

/// Approximate planar coordinate used for air-quality station lookup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TmCoordinate {
    pub tm_x: f64,
    pub tm_y: f64,
}

/// Precomputed Lambert Conformal Conic constants for the forecast grid.
#[derive(Debug, Clone, Copy)]
struct LambertGrid {
    /// Earth radius expressed in grid cells
    re: f64,
    /// Cone constant
    sn: f64,
    /// Scale factor
    sf: f64,
    /// Radius at the origin latitude
    ro: f64,
    olon: f64,
}

impl LambertGrid {
    fn kma() -> Self {
        let re = EARTH_RADIUS_KM / GRID_SPACING_KM;
        let slat1 = STANDARD_PARALLEL_1 * DEG_TO_RAD;
        let slat2 = STANDARD_PARALLEL_2 * DEG_TO_RAD;
        let olat = ORIGIN_LAT * DEG_TO_RAD;

        let sn = ((slat1.cos() / slat2.cos()).ln())
            / ((PI * 0.25 + slat2 * 0.5).tan() / (PI * 0.25 + slat1 * 0.5).tan()).ln();
        let sf = (PI * 0.25 + slat1 * 0.5).tan().powf(sn) * slat1.cos() / sn;
        let ro = re * sf / (PI * 0.25 + olat * 0.5).tan().powf(sn);

        Self {
            re,
            sn,
            sf,
            ro,
            olon: ORIGIN_LON * DEG_TO_RAD,
        }
    }

    fn project(&self, latitude: f64, longitude: f64) -> GridCoordinate {
        let ra = self.re * self.sf
            / (PI * 0.25 + latitude * DEG_TO_RAD * 0.5)
                .tan()
                .powf(self.sn);

        let mut theta = longitude * DEG_TO_RAD - self.olon;
        if theta > PI {
            theta -= 2.0 * PI;
        }
        if theta < -PI {
            theta += 2.0 * PI;
        }
        theta *= self.sn;

        GridCoordinate {
            nx: round_half_up(ra * theta.sin() + ORIGIN_X),
            ny: round_half_up(self.ro - ra * theta.cos() + ORIGIN_Y),
        }
    }
}

/// Rounds to the nearest integer, halves going up (towards +inf).
fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

/// Convert a WGS84 latitude/longitude into the forecast grid cell.
#[must_use]
pub fn to_grid(latitude: f64, longitude: f64) -> GridCoordinate {
    LambertGrid::kma().project(latitude, longitude)
}

/// Convert a WGS84 latitude/longitude into the approximate TM plane.
#[must_use]
pub fn to_tm(latitude: f64, longitude: f64) -> TmCoordinate {
    TmCoordinate {
        tm_x: TM_OFFSET_X + ((longitude - TM_CENTER_LON) * TM_SCALE).round(),
        tm_y: TM_OFFSET_Y + ((latitude - TM_CENTER_LAT) * TM_SCALE).round(),
    }
}
