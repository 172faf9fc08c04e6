//! Router tests with scripted sources

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;

use poseidon::aggregation::AggregationService;
use poseidon::api::{self, AppState};
use poseidon::error::SourceFailure;
use poseidon::models::{
    AirQualitySnapshot, Concentrations, ForecastSlot, GridForecastSeries, GridNowcast, ReadingData,
};
use poseidon::orchestrator::FallbackOrchestrator;
use poseidon::points;
use poseidon::sources::{NearbyStation, StationLookup};
use poseidon::synthetic::{StaticBaselines, SyntheticGenerator, SyntheticKind};
use poseidon::time_window::{self, ProductType};
use poseidon::web;
use poseidon::{PointQuery, RainfallLevel, Reading, SourceClient, SourceLabel, TmCoordinate};

/// Source that either answers with a canned reading or fails
struct Scripted {
    label: SourceLabel,
    failure: Option<SourceFailure>,
}

impl Scripted {
    fn ok(label: SourceLabel) -> Arc<dyn SourceClient> {
        Arc::new(Self {
            label,
            failure: None,
        })
    }

    fn failing(label: SourceLabel, failure: SourceFailure) -> Arc<dyn SourceClient> {
        Arc::new(Self {
            label,
            failure: Some(failure),
        })
    }
}

#[async_trait]
impl SourceClient for Scripted {
    fn label(&self) -> SourceLabel {
        self.label
    }

    async fn fetch(&self, query: &PointQuery) -> Result<Reading, SourceFailure> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let data = match self.label {
            SourceLabel::AirKorea => ReadingData::AirQualitySnapshot(AirQualitySnapshot::new(
                query.point.air_station.clone().unwrap_or_default(),
                Some("2024-01-01 10:00".into()),
                Concentrations {
                    pm10: Some(25.0),
                    ..Concentrations::default()
                },
                None,
            )),
            SourceLabel::GridForecast | SourceLabel::VillageForecast => {
                let product = if self.label == SourceLabel::GridForecast {
                    ProductType::ShortRangeForecast
                } else {
                    ProductType::VillageForecast
                };
                let mut slot = ForecastSlot::empty(time_window::local_time(query.now));
                slot.pop = Some(30);
                slot.pcp = Some(0.0);
                ReadingData::GridForecastSeries(GridForecastSeries {
                    product,
                    window: time_window::resolve_at(product, query.now),
                    grid: query.grid,
                    series: vec![slot],
                    min_pop: Some(30),
                    min_pcp: Some(0.0),
                })
            }
            _ => ReadingData::GridNowcast(GridNowcast {
                window: time_window::resolve_at(ProductType::ShortRangeNowcast, query.now),
                grid: query.grid,
                precipitation_mm: 0.0,
                precipitation_type: 0,
                temperature_c: 2.0,
                humidity_pct: None,
                wind_speed_ms: None,
                rainfall_level: RainfallLevel::None,
            }),
        };
        Ok(Reading::live(self.label, data))
    }
}

/// Source whose upstream never answers
struct Hanging(SourceLabel);

impl Hanging {
    fn source(label: SourceLabel) -> Arc<dyn SourceClient> {
        Arc::new(Self(label))
    }
}

#[async_trait]
impl SourceClient for Hanging {
    fn label(&self) -> SourceLabel {
        self.0
    }

    async fn fetch(&self, _query: &PointQuery) -> Result<Reading, SourceFailure> {
        std::future::pending().await
    }
}

struct FixedStations;

#[async_trait]
impl StationLookup for FixedStations {
    async fn nearby_stations(
        &self,
        tm: TmCoordinate,
    ) -> Result<Vec<NearbyStation>, SourceFailure> {
        if tm.tm_x < 0.0 {
            return Err(SourceFailure::EmptyResult("outside coverage".into()));
        }
        Ok(vec![NearbyStation {
            station_name: "중구".into(),
            addr: None,
            distance_km: Some(0.8),
        }])
    }
}

fn service(
    points: Vec<poseidon::GeoPoint>,
    chain: Vec<Arc<dyn SourceClient>>,
    kind: SyntheticKind,
) -> AggregationService {
    let orchestrator = FallbackOrchestrator::new(
        chain,
        SyntheticGenerator::new(kind, Arc::new(StaticBaselines::default())),
    );
    AggregationService::new(points, Arc::new(orchestrator)).unwrap()
}

/// Upstreams up when `healthy`, otherwise everything fails
fn app(healthy: bool) -> axum::Router {
    let source = |label| {
        if healthy {
            Scripted::ok(label)
        } else {
            Scripted::failing(label, SourceFailure::EmptyResult("no rows".into()))
        }
    };

    let weather = service(
        points::default_weather_points(),
        vec![source(SourceLabel::Asos), source(SourceLabel::GridNowcast)],
        SyntheticKind::Weather,
    );
    let air = service(
        points::default_air_stations(),
        vec![source(SourceLabel::AirKorea)],
        SyntheticKind::AirQuality,
    );

    let state = AppState::new(
        weather,
        air,
        source(SourceLabel::GridNowcast),
        source(SourceLabel::GridForecast),
        source(SourceLabel::VillageForecast),
        source(SourceLabel::Asos),
        source(SourceLabel::AirKorea),
        Arc::new(FixedStations),
    );
    api::router(Arc::new(state))
}

async fn status_of(app: axum::Router, uri: &str) -> StatusCode {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(app(true), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_weather_points_live() {
    let (status, body) = get(app(true), "/kma/weather-points").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 9);
    assert_eq!(body["points"].as_array().unwrap().len(), 9);
    assert_eq!(body["points"][0]["point"]["name"], "Seoul");
    assert_eq!(body["points"][0]["reading"]["sourceLabel"], "asos");
    assert_eq!(body["sources"]["asos"], 9);
}

#[tokio::test]
async fn test_weather_points_degrade_instead_of_failing() {
    let (status, body) = get(app(false), "/kma/weather-points").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 9);
    assert_eq!(body["sources"]["synthetic"], 9);
    assert!(
        body["points"]
            .as_array()
            .unwrap()
            .iter()
            .all(|p| p["reading"]["isSynthetic"] == true)
    );
}

#[tokio::test]
async fn test_dust_stations_flag_mock_data() {
    let (status, body) = get(app(false), "/airkorea/dust-stations").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["isMockData"], true);
    assert_eq!(body["count"], 8);
    assert!(body["stations"][0]["reading"]["grades"].is_object());

    let (_, body) = get(app(true), "/airkorea/dust-stations").await;
    assert_eq!(body["isMockData"], false);
    assert_eq!(body["stations"][0]["reading"]["stationName"], "종로구");
}

#[tokio::test]
async fn test_single_point_requires_coordinates() {
    let (status, body) = get(app(true), "/kma/ultra-ncst?lat=37.5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
    assert_eq!(body["reason"], "Missing lat or lon parameter");

    let (status, body) = get(app(true), "/kma/vilage-fcst?lat=abc&lon=127").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_single_point_nowcast() {
    let (status, body) = get(app(true), "/kma/ultra-ncst?lat=37.5665&lon=126.978").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nx"], 60);
    assert_eq!(body["ny"], 127);
    assert_eq!(body["sourceLabel"], "grid-nowcast");
    assert_eq!(body["kind"], "grid-nowcast");
}

#[tokio::test]
async fn test_single_point_forecast_series() {
    let (status, body) = get(app(true), "/kma/ultra-fcst?lat=37.5665&lon=126.978").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "grid-forecast-series");
    assert_eq!(body["product"], "short-range-forecast");
    assert_eq!(body["sourceLabel"], "grid-forecast");
    assert_eq!(body["nx"], 60);

    let (status, body) = get(app(true), "/kma/vilage-fcst?lat=37.5665&lon=126.978").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["product"], "village-forecast");
    assert_eq!(body["sourceLabel"], "village-forecast");
    assert_eq!(body["series"].as_array().unwrap().len(), 1);
    assert_eq!(body["minPop"], 30);
}

#[tokio::test]
async fn test_single_point_surfaces_upstream_failure() {
    let (status, body) = get(app(false), "/kma/ultra-fcst?lat=37.5665&lon=126.978").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);
    assert_eq!(body["reason"], "empty-result");

    let uri = format!(
        "/airkorea/realtime?stationName={}",
        urlencoding::encode("종로구")
    );
    let (status, body) = get(app(false), &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["reason"], "empty-result");
}

#[tokio::test]
async fn test_ground_observation_requires_station() {
    let (status, body) = get(app(true), "/kma/asos").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "Missing stnId parameter");
}

#[tokio::test]
async fn test_nearby_stations() {
    let (status, body) = get(app(true), "/airkorea/nearby-stations?lat=37.5665&lon=126.978").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tmX"], 395_600.0);
    assert_eq!(body["tmY"], 613_300.0);
    assert_eq!(body["stations"][0]["stationName"], "중구");

    let (status, _) = get(app(true), "/airkorea/nearby-stations?tmX=1000&tmY=2000").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app(true), "/airkorea/nearby-stations").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_tm_coordinates() {
    let (status, body) = get(app(true), "/airkorea/tm-coordinates?lat=37.5665&lon=126.978").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tmX"], 395_600.0);
    assert_eq!(body["tmY"], 613_300.0);
}

#[tokio::test]
async fn test_shutdown_cancels_aggregation() {
    let weather = service(
        points::default_weather_points(),
        vec![Scripted::ok(SourceLabel::Asos)],
        SyntheticKind::Weather,
    );
    let air = service(
        points::default_air_stations(),
        vec![Scripted::ok(SourceLabel::AirKorea)],
        SyntheticKind::AirQuality,
    );
    let state = Arc::new(AppState::new(
        weather,
        air,
        Scripted::ok(SourceLabel::GridNowcast),
        Scripted::ok(SourceLabel::GridForecast),
        Scripted::ok(SourceLabel::VillageForecast),
        Scripted::ok(SourceLabel::Asos),
        Scripted::ok(SourceLabel::AirKorea),
        Arc::new(FixedStations),
    ));
    state.begin_shutdown();

    let (status, body) = get(api::router(state), "/kma/weather-points").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["reason"], "cancelled");
}

#[tokio::test(start_paused = true)]
async fn test_served_app_degrades_when_upstreams_hang() {
    // One point at a time with two hanging sources: 9 x 2 x 10 s of call timeouts
    let weather = service(
        points::default_weather_points(),
        vec![
            Hanging::source(SourceLabel::Asos),
            Hanging::source(SourceLabel::GridNowcast),
        ],
        SyntheticKind::Weather,
    )
    .with_max_concurrency(1);
    let air = service(
        points::default_air_stations(),
        vec![Hanging::source(SourceLabel::AirKorea)],
        SyntheticKind::AirQuality,
    )
    .with_max_concurrency(1);
    let state = AppState::new(
        weather,
        air,
        Hanging::source(SourceLabel::GridNowcast),
        Hanging::source(SourceLabel::GridForecast),
        Hanging::source(SourceLabel::VillageForecast),
        Hanging::source(SourceLabel::Asos),
        Hanging::source(SourceLabel::AirKorea),
        Arc::new(FixedStations),
    );
    let app = web::app(Arc::new(state));

    let (status, body) = get(app.clone(), "/kma/weather-points").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 9);
    assert_eq!(body["sources"]["synthetic"], 9);

    let (status, body) = get(app.clone(), "/airkorea/dust-stations").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isMockData"], true);

    let status = status_of(app, "/kma/ultra-ncst?lat=37.5665&lon=126.978").await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
}
