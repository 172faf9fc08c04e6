//! Poseidon - environmental data aggregation backend
//!
//! This library resolves configured points to weather and air-quality
//! readings, trying upstream providers in priority order and falling back
//! to clearly flagged synthetic readings when none of them answers.

pub mod aggregation;
pub mod api;
pub mod config;
pub mod error;
pub mod grade;
pub mod grid;
pub mod limiter;
pub mod models;
pub mod orchestrator;
pub mod points;
pub mod sources;
pub mod synthetic;
pub mod time_window;
pub mod web;

// Re-export core types for public API
pub use aggregation::AggregationService;
pub use config::PoseidonConfig;
pub use error::{PoseidonError, SourceFailure};
pub use grade::{Grade, Pollutant, RainfallLevel};
pub use grid::{GridCoordinate, TmCoordinate, to_grid, to_tm};
pub use models::{AggregatedResult, GeoPoint, PointReading, Reading, SourceLabel};
pub use orchestrator::FallbackOrchestrator;
pub use sources::{PointQuery, SourceClient};
pub use time_window::{ProductType, TimeWindow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, PoseidonError>;
