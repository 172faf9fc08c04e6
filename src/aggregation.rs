//! Multi-point aggregation.
//!
//! Every configured point is resolved through the [`FallbackOrchestrator`]
//! inside its own failure boundary. Points run through a bounded, order
//! preserving stream; the orchestrator's shared throttle keeps the upstream
//! request rate polite regardless of the concurrency level.

use chrono::{DateTime, Utc};
use futures::{FutureExt, StreamExt, stream};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::Result;
use crate::error::PoseidonError;
use crate::models::{AggregatedResult, GeoPoint, PointReading};
use crate::orchestrator::FallbackOrchestrator;
use crate::points;
use crate::sources::PointQuery;

/// Default number of points resolved at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Resolves the full point list into an [`AggregatedResult`]
pub struct AggregationService {
    points: Vec<GeoPoint>,
    orchestrator: Arc<FallbackOrchestrator>,
    max_concurrency: usize,
}

impl AggregationService {
    /// Create a service over a validated point list.
    ///
    /// A malformed point list is a configuration error.
    pub fn new(points: Vec<GeoPoint>, orchestrator: Arc<FallbackOrchestrator>) -> Result<Self> {
        points::validate(&points)?;
        Ok(Self {
            points,
            orchestrator,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        })
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    #[must_use]
    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    #[must_use]
    pub fn orchestrator(&self) -> &FallbackOrchestrator {
        &self.orchestrator
    }

    /// Aggregate every point as of now.
    pub async fn aggregate(&self) -> AggregatedResult {
        self.aggregate_at(Utc::now()).await
    }

    /// Aggregate every point with time windows resolved against `now`.
    #[instrument(skip(self), fields(points = self.points.len()))]
    pub async fn aggregate_at(&self, now: DateTime<Utc>) -> AggregatedResult {
        let start = std::time::Instant::now();

        // Indices keep the per-point future free of a borrowed closure argument
        let resolved: Vec<(PointReading, usize)> = stream::iter(0..self.points.len())
            .map(|index| self.resolve_point(&self.points[index], now))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let schema_failures = resolved.iter().map(|(_, schema)| schema).sum();
        let result = AggregatedResult::new(
            resolved.into_iter().map(|(p, _)| p).collect(),
            schema_failures,
        );

        info!(
            "Aggregated {} points ({} synthetic, {} schema failures) in {:.3}s",
            result.count(),
            result.synthetic_count(),
            result.schema_failures,
            start.elapsed().as_secs_f64()
        );
        result
    }

    /// Aggregate, giving up with [`PoseidonError::Cancelled`] as soon as
    /// `cancel` completes. Partial results are discarded.
    pub async fn aggregate_until<F>(
        &self,
        now: DateTime<Utc>,
        cancel: F,
    ) -> Result<AggregatedResult>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancel => {
                info!("Aggregation cancelled");
                Err(PoseidonError::Cancelled)
            }
            result = self.aggregate_at(now) => Ok(result),
        }
    }

    async fn resolve_point(&self, point: &GeoPoint, now: DateTime<Utc>) -> (PointReading, usize) {
        let query = PointQuery::new(point.clone(), now);

        match AssertUnwindSafe(self.orchestrator.resolve(&query))
            .catch_unwind()
            .await
        {
            Ok(resolution) => {
                let schema_failures = resolution.schema_failures();
                (
                    PointReading {
                        point: point.clone(),
                        reading: resolution.reading,
                    },
                    schema_failures,
                )
            }
            Err(panic) => {
                error!(
                    "Resolving {} panicked ({}), using synthetic reading",
                    point.name,
                    panic_message(panic.as_ref())
                );
                (
                    PointReading {
                        point: point.clone(),
                        reading: self.orchestrator.fallback().reading(point, now),
                    },
                    0,
                )
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
