//! HTTP endpoints
//!
//! Aggregation endpoints never fail because an upstream is down; they
//! degrade to synthetic readings and flag them. Single-point endpoints
//! surface a typed `{ error: true, reason }` payload instead.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    handler::Handler,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{MethodRouter, get},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, warn};

use crate::aggregation::AggregationService;
use crate::error::{PoseidonError, SourceFailure};
use crate::grid::{self, TmCoordinate};
use crate::models::{AggregatedResult, GeoPoint, PointReading, Reading};
use crate::sources::{NearbyStation, PointQuery, SourceClient, StationLookup};

/// Everything the handlers share
pub struct AppState {
    pub weather_points: AggregationService,
    pub air_stations: AggregationService,
    pub nowcast: Arc<dyn SourceClient>,
    pub short_forecast: Arc<dyn SourceClient>,
    pub village_forecast: Arc<dyn SourceClient>,
    pub ground_observation: Arc<dyn SourceClient>,
    pub air_quality: Arc<dyn SourceClient>,
    pub stations: Arc<dyn StationLookup>,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        weather_points: AggregationService,
        air_stations: AggregationService,
        nowcast: Arc<dyn SourceClient>,
        short_forecast: Arc<dyn SourceClient>,
        village_forecast: Arc<dyn SourceClient>,
        ground_observation: Arc<dyn SourceClient>,
        air_quality: Arc<dyn SourceClient>,
        stations: Arc<dyn StationLookup>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            weather_points,
            air_stations,
            nowcast,
            short_forecast,
            village_forecast,
            ground_observation,
            air_quality,
            stations,
            shutdown,
        }
    }

    /// Abandon in-flight aggregations.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Completes once [`AppState::begin_shutdown`] has been called.
    pub fn shutdown_requested(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.shutdown.subscribe();
        async move {
            let stopped = receiver.wait_for(|stop| *stop).await.is_ok();
            if !stopped {
                // Sender gone without a shutdown; never cancel
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Error payload for single-point endpoints
#[derive(Debug)]
pub struct ApiError(PoseidonError);

impl From<PoseidonError> for ApiError {
    fn from(error: PoseidonError) -> Self {
        Self(error)
    }
}

impl From<SourceFailure> for ApiError {
    fn from(failure: SourceFailure) -> Self {
        Self(failure.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason) = match &self.0 {
            PoseidonError::Validation { message } => (StatusCode::BAD_REQUEST, message.clone()),
            PoseidonError::Upstream { source } => {
                let status = match source {
                    SourceFailure::EmptyResult(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, source.reason().to_string())
            }
            PoseidonError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled".to_string()),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.user_message()),
        };
        let body = Json(json!({
            "error": true,
            "reason": reason,
            "detail": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `lat`/`lon` query parameters, kept as text so bad input gets our payload
#[derive(Debug, Deserialize)]
pub struct CoordinateParams {
    lat: Option<String>,
    lon: Option<String>,
}

impl CoordinateParams {
    fn point(&self) -> Result<GeoPoint, ApiError> {
        let (Some(lat), Some(lon)) = (self.lat.as_deref(), self.lon.as_deref()) else {
            return Err(PoseidonError::validation("Missing lat or lon parameter").into());
        };
        let latitude = parse_coordinate("lat", lat)?;
        let longitude = parse_coordinate("lon", lon)?;
        let point = GeoPoint::new(format!("{latitude:.4},{longitude:.4}"), latitude, longitude);
        if !point.has_valid_coordinates() {
            return Err(PoseidonError::validation(format!(
                "Coordinates out of range: {}",
                point.format_coordinates()
            ))
            .into());
        }
        Ok(point)
    }
}

fn parse_coordinate(name: &str, raw: &str) -> Result<f64, ApiError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| PoseidonError::validation(format!("Invalid {name} parameter: {raw}")).into())
}

#[derive(Debug, Deserialize)]
pub struct StationParams {
    #[serde(rename = "stnId")]
    stn_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StationNameParams {
    #[serde(rename = "stationName")]
    station_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    lat: Option<String>,
    lon: Option<String>,
    #[serde(rename = "tmX")]
    tm_x: Option<String>,
    #[serde(rename = "tmY")]
    tm_y: Option<String>,
}

fn required(value: Option<&str>, name: &str) -> Result<String, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PoseidonError::validation(format!("Missing {name} parameter")).into())
}

/// A single-point reading with the coordinates it was resolved for
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointResponse {
    pub lat: f64,
    pub lon: f64,
    pub nx: i32,
    pub ny: i32,
    #[serde(flatten)]
    pub reading: Reading,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherPointsResponse {
    #[serde(flatten)]
    pub result: AggregatedResult,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DustStationsResponse {
    pub success: bool,
    pub stations: Vec<PointReading>,
    pub count: usize,
    pub is_mock_data: bool,
    pub schema_failures: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyStationsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub tm: TmCoordinate,
    pub stations: Vec<NearbyStation>,
}

pub fn router(state: Arc<AppState>) -> Router {
    routes(state, None)
}

/// Router whose single-point lookups give up after `lookup_timeout`.
///
/// Aggregation routes stay unbounded: each upstream call already carries its
/// own timeout and the result degrades to synthetic readings instead.
pub fn router_with_lookup_timeout(state: Arc<AppState>, lookup_timeout: Duration) -> Router {
    routes(state, Some(lookup_timeout))
}

fn routes(state: Arc<AppState>, lookup_timeout: Option<Duration>) -> Router {
    let kma = Router::new()
        .route("/weather-points", get(get_weather_points))
        .route("/ultra-ncst", lookup(get_ultra_nowcast, lookup_timeout))
        .route("/ultra-fcst", lookup(get_ultra_forecast, lookup_timeout))
        .route("/vilage-fcst", lookup(get_village_forecast, lookup_timeout))
        .route("/asos", lookup(get_ground_observation, lookup_timeout));

    let airkorea = Router::new()
        .route("/dust-stations", get(get_dust_stations))
        .route("/stations", get(get_configured_stations))
        .route("/realtime", lookup(get_realtime, lookup_timeout))
        .route("/nearby-stations", lookup(get_nearby_stations, lookup_timeout))
        .route("/tm-coordinates", get(get_tm_coordinates));

    Router::new()
        .route("/health", get(health))
        .nest("/kma", kma)
        .nest("/airkorea", airkorea)
        .with_state(state)
}

fn lookup<H, T>(handler: H, timeout: Option<Duration>) -> MethodRouter<Arc<AppState>>
where
    H: Handler<T, Arc<AppState>>,
    T: 'static,
{
    let route = get(handler);
    match timeout {
        Some(limit) => route.layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            limit,
        )),
        None => route,
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn get_weather_points(
    State(state): State<Arc<AppState>>,
) -> ApiResult<WeatherPointsResponse> {
    let result = state
        .weather_points
        .aggregate_until(Utc::now(), state.shutdown_requested())
        .await?;
    let count = result.count();
    Ok(Json(WeatherPointsResponse { result, count }))
}

async fn get_dust_stations(State(state): State<Arc<AppState>>) -> ApiResult<DustStationsResponse> {
    let result = state
        .air_stations
        .aggregate_until(Utc::now(), state.shutdown_requested())
        .await?;
    if result.any_synthetic() {
        warn!(
            "{} of {} air-quality stations are synthetic",
            result.synthetic_count(),
            result.count()
        );
    }
    Ok(Json(DustStationsResponse {
        success: true,
        count: result.count(),
        is_mock_data: result.any_synthetic(),
        schema_failures: result.schema_failures,
        stations: result.points,
    }))
}

async fn get_configured_stations(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stations = state.air_stations.points();
    Json(json!({
        "success": true,
        "stations": stations,
        "count": stations.len(),
    }))
}

async fn fetch_point(source: &dyn SourceClient, point: GeoPoint) -> ApiResult<PointResponse> {
    let query = PointQuery::new(point, Utc::now());
    debug!(
        "Single-point {} lookup at {}",
        source.label().as_str(),
        query.point.format_coordinates()
    );
    let reading = source.fetch(&query).await?;
    Ok(Json(PointResponse {
        lat: query.point.latitude,
        lon: query.point.longitude,
        nx: query.grid.nx,
        ny: query.grid.ny,
        reading,
    }))
}

async fn get_ultra_nowcast(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CoordinateParams>,
) -> ApiResult<PointResponse> {
    fetch_point(state.nowcast.as_ref(), params.point()?).await
}

async fn get_ultra_forecast(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CoordinateParams>,
) -> ApiResult<PointResponse> {
    fetch_point(state.short_forecast.as_ref(), params.point()?).await
}

async fn get_village_forecast(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CoordinateParams>,
) -> ApiResult<PointResponse> {
    fetch_point(state.village_forecast.as_ref(), params.point()?).await
}

async fn get_ground_observation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StationParams>,
) -> ApiResult<Reading> {
    let station_id = required(params.stn_id.as_deref(), "stnId")?;
    let point = GeoPoint::new(format!("station {station_id}"), 0.0, 0.0).with_station(station_id);
    let reading = state
        .ground_observation
        .fetch(&PointQuery::new(point, Utc::now()))
        .await?;
    Ok(Json(reading))
}

async fn get_realtime(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StationNameParams>,
) -> ApiResult<Reading> {
    let station = required(params.station_name.as_deref(), "stationName")?;
    let point = GeoPoint::new(station.clone(), 0.0, 0.0).with_air_station(station);
    let reading = state
        .air_quality
        .fetch(&PointQuery::new(point, Utc::now()))
        .await?;
    Ok(Json(reading))
}

fn tm_from_params(params: &NearbyParams) -> Result<TmCoordinate, ApiError> {
    if let (Some(x), Some(y)) = (params.tm_x.as_deref(), params.tm_y.as_deref()) {
        return Ok(TmCoordinate {
            tm_x: parse_coordinate("tmX", x)?,
            tm_y: parse_coordinate("tmY", y)?,
        });
    }
    let coordinates = CoordinateParams {
        lat: params.lat.clone(),
        lon: params.lon.clone(),
    };
    let point = coordinates
        .point()
        .map_err(|_| PoseidonError::validation("Provide lat and lon, or tmX and tmY"))?;
    Ok(point.tm())
}

async fn get_nearby_stations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearbyParams>,
) -> ApiResult<NearbyStationsResponse> {
    let tm = tm_from_params(&params)?;
    let stations = state.stations.nearby_stations(tm).await?;
    Ok(Json(NearbyStationsResponse {
        success: true,
        tm,
        stations,
    }))
}

async fn get_tm_coordinates(
    Query(params): Query<CoordinateParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let point = params.point()?;
    let tm = grid::to_tm(point.latitude, point.longitude);
    Ok(Json(json!({
        "success": true,
        "lat": point.latitude,
        "lon": point.longitude,
        "tmX": tm.tm_x,
        "tmY": tm.tm_y,
    })))
}
