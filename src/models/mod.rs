//! Data models for the Poseidon aggregation engine
//!
//! - Point: statically configured query locations
//! - Reading: normalized upstream readings and the aggregated result

pub mod point;
pub mod reading;

// Re-export all public types for convenient access
pub use point::GeoPoint;
pub use reading::{
    AggregatedResult, AirQualitySnapshot, Concentrations, ForecastSlot, GridForecastSeries,
    GridNowcast, GroundObservation, PointReading, Reading, ReadingData, SourceLabel,
};
