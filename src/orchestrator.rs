//! Priority-ordered fallback across sources for a single point.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::error::SourceFailure;
use crate::limiter::Throttle;
use crate::models::{Reading, SourceLabel};
use crate::sources::{PointQuery, SourceClient};
use crate::synthetic::SyntheticGenerator;

/// Default bound on a single upstream call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// A source that was tried and failed
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub source: SourceLabel,
    pub failure: SourceFailure,
}

/// The reading chosen for a point, plus the failures on the way there
#[derive(Debug, Clone)]
pub struct Resolution {
    pub reading: Reading,
    pub attempts: Vec<Attempt>,
}

impl Resolution {
    /// Number of attempts that failed because the payload had the wrong shape
    #[must_use]
    pub fn schema_failures(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.failure.is_schema())
            .count()
    }
}

/// Tries each source in order and falls back to a synthetic reading.
///
/// Sources are never retried. The first successful reading wins and later
/// sources are not called.
pub struct FallbackOrchestrator {
    chain: Vec<Arc<dyn SourceClient>>,
    fallback: SyntheticGenerator,
    call_timeout: Duration,
    throttle: Arc<Throttle>,
}

impl FallbackOrchestrator {
    #[must_use]
    pub fn new(chain: Vec<Arc<dyn SourceClient>>, fallback: SyntheticGenerator) -> Self {
        Self {
            chain,
            fallback,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            throttle: Arc::new(Throttle::disabled()),
        }
    }

    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Share a throttle with other orchestrators hitting the same providers.
    #[must_use]
    pub fn with_throttle(mut self, throttle: Arc<Throttle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Source labels in priority order
    #[must_use]
    pub fn chain_labels(&self) -> Vec<SourceLabel> {
        self.chain.iter().map(|source| source.label()).collect()
    }

    #[must_use]
    pub fn fallback(&self) -> &SyntheticGenerator {
        &self.fallback
    }

    /// Resolve one point to exactly one reading.
    pub async fn resolve(&self, query: &PointQuery) -> Resolution {
        let mut attempts = Vec::new();

        for source in &self.chain {
            let label = source.label();
            self.throttle.acquire().await;

            let outcome = match timeout(self.call_timeout, source.fetch(query)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(SourceFailure::UpstreamUnreachable(format!(
                    "no answer within {:?}",
                    self.call_timeout
                ))),
            };

            match outcome {
                Ok(reading) => {
                    debug!(
                        "{} answered for {} after {} failed attempts",
                        label.as_str(),
                        query.point.name,
                        attempts.len()
                    );
                    return Resolution { reading, attempts };
                }
                Err(failure) => {
                    if failure.is_schema() {
                        error!(
                            source = label.as_str(),
                            point = %query.point.name,
                            failure_kind = "schema",
                            "Unexpected payload shape: {}",
                            failure
                        );
                    } else {
                        warn!(
                            source = label.as_str(),
                            point = %query.point.name,
                            failure_kind = failure.reason(),
                            "Source failed: {}",
                            failure
                        );
                    }
                    attempts.push(Attempt {
                        source: label,
                        failure,
                    });
                }
            }
        }

        warn!(
            "All {} sources failed for {}, using synthetic reading",
            self.chain.len(),
            query.point.name
        );
        Resolution {
            reading: self.fallback.reading(&query.point, query.now),
            attempts,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{AirQualitySnapshot, Concentrations, GeoPoint, ReadingData};
    use crate::synthetic::{StaticBaselines, SyntheticKind};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted source used by orchestrator and aggregation tests
    pub(crate) struct FakeSource {
        pub label: SourceLabel,
        pub behaviour: Behaviour,
        pub calls: AtomicUsize,
    }

    #[derive(Clone)]
    pub(crate) enum Behaviour {
        Succeed,
        Fail(SourceFailure),
        Hang,
        Panic,
        /// Fail for points whose name is listed
        FailFor(Vec<&'static str>),
        /// Panic for points whose name is listed
        PanicFor(Vec<&'static str>),
    }

    impl FakeSource {
        pub(crate) fn new(label: SourceLabel, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                label,
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn reading(&self, query: &PointQuery) -> Reading {
            Reading::live(
                self.label,
                ReadingData::AirQualitySnapshot(AirQualitySnapshot::new(
                    query.point.name.clone(),
                    None,
                    Concentrations {
                        pm10: Some(20.0),
                        ..Concentrations::default()
                    },
                    None,
                )),
            )
        }
    }

    #[async_trait]
    impl SourceClient for FakeSource {
        fn label(&self) -> SourceLabel {
            self.label
        }

        async fn fetch(&self, query: &PointQuery) -> Result<Reading, SourceFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Succeed => Ok(self.reading(query)),
                Behaviour::Fail(failure) => Err(failure.clone()),
                Behaviour::Hang => std::future::pending().await,
                Behaviour::Panic => panic!("source exploded for {}", query.point.name),
                Behaviour::PanicFor(names) => {
                    if names.contains(&query.point.name.as_str()) {
                        panic!("source exploded for {}", query.point.name);
                    }
                    Ok(self.reading(query))
                }
                Behaviour::FailFor(names) => {
                    if names.contains(&query.point.name.as_str()) {
                        Err(SourceFailure::EmptyResult("scripted".into()))
                    } else {
                        Ok(self.reading(query))
                    }
                }
            }
        }
    }

    pub(crate) fn chain(sources: &[&Arc<FakeSource>]) -> Vec<Arc<dyn SourceClient>> {
        sources
            .iter()
            .map(|source| Arc::clone(*source) as Arc<dyn SourceClient>)
            .collect()
    }

    pub(crate) fn synthetic() -> SyntheticGenerator {
        SyntheticGenerator::new(
            SyntheticKind::AirQuality,
            Arc::new(StaticBaselines::default()),
        )
    }

    fn query() -> PointQuery {
        PointQuery::new(GeoPoint::new("Seoul", 37.5665, 126.978), Utc::now())
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let first = FakeSource::new(SourceLabel::Asos, Behaviour::Succeed);
        let second = FakeSource::new(SourceLabel::GridNowcast, Behaviour::Succeed);
        let orchestrator = FallbackOrchestrator::new(chain(&[&first, &second]), synthetic());

        let resolution = orchestrator.resolve(&query()).await;
        assert_eq!(resolution.reading.source_label, SourceLabel::Asos);
        assert!(resolution.attempts.is_empty());
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_through_in_order() {
        let first = FakeSource::new(
            SourceLabel::Asos,
            Behaviour::Fail(SourceFailure::UpstreamUnreachable("refused".into())),
        );
        let second = FakeSource::new(
            SourceLabel::GridNowcast,
            Behaviour::Fail(SourceFailure::SchemaMismatch("missing body".into())),
        );
        let third = FakeSource::new(SourceLabel::GridForecast, Behaviour::Succeed);
        let orchestrator = FallbackOrchestrator::new(
            chain(&[&first, &second, &third]),
            synthetic(),
        );

        let resolution = orchestrator.resolve(&query()).await;
        assert_eq!(resolution.reading.source_label, SourceLabel::GridForecast);
        assert!(!resolution.reading.is_synthetic);
        assert_eq!(
            resolution
                .attempts
                .iter()
                .map(|a| a.source)
                .collect::<Vec<_>>(),
            vec![SourceLabel::Asos, SourceLabel::GridNowcast]
        );
        assert_eq!(resolution.schema_failures(), 1);
        assert_eq!((first.calls(), second.calls(), third.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_all_failures_yield_synthetic() {
        let only = FakeSource::new(
            SourceLabel::AirKorea,
            Behaviour::Fail(SourceFailure::UpstreamErrorCode {
                code: "30".into(),
                message: "bad key".into(),
            }),
        );
        let orchestrator = FallbackOrchestrator::new(chain(&[&only]), synthetic());

        let resolution = orchestrator.resolve(&query()).await;
        assert!(resolution.reading.is_synthetic);
        assert_eq!(resolution.reading.source_label, SourceLabel::Synthetic);
        assert_eq!(resolution.attempts.len(), 1);
        assert_eq!(only.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_chain_is_synthetic() {
        let orchestrator = FallbackOrchestrator::new(Vec::new(), synthetic());
        let resolution = orchestrator.resolve(&query()).await;
        assert!(resolution.reading.is_synthetic);
        assert!(resolution.attempts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_source_times_out() {
        let hanging = FakeSource::new(SourceLabel::Asos, Behaviour::Hang);
        let backup = FakeSource::new(SourceLabel::GridNowcast, Behaviour::Succeed);
        let orchestrator = FallbackOrchestrator::new(chain(&[&hanging, &backup]), synthetic())
            .with_call_timeout(Duration::from_secs(10));

        let start = tokio::time::Instant::now();
        let resolution = orchestrator.resolve(&query()).await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(resolution.reading.source_label, SourceLabel::GridNowcast);
        assert!(matches!(
            resolution.attempts[0].failure,
            SourceFailure::UpstreamUnreachable(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_upstream_calls() {
        let failing = FakeSource::new(
            SourceLabel::Asos,
            Behaviour::Fail(SourceFailure::EmptyResult("none".into())),
        );
        let backup = FakeSource::new(SourceLabel::GridNowcast, Behaviour::Succeed);
        let orchestrator = FallbackOrchestrator::new(chain(&[&failing, &backup]), synthetic())
            .with_throttle(Arc::new(Throttle::new(Duration::from_millis(200), 1)));

        let start = tokio::time::Instant::now();
        orchestrator.resolve(&query()).await;
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }
}
