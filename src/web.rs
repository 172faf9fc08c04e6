use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::aggregation::AggregationService;
use crate::api::{self, AppState};
use crate::config::PoseidonConfig;
use crate::limiter::Throttle;
use crate::orchestrator::FallbackOrchestrator;
use crate::points::PointSets;
use crate::sources::{
    AirKoreaClient, AirQualitySource, AsosSource, KmaClient, NowcastSource, ShortForecastSource,
    SourceClient, VillageForecastSource, build_http_client,
};
use crate::synthetic::{StaticBaselines, SyntheticGenerator, SyntheticKind};

/// Upper bound for a single-point lookup request
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(120);

/// Wire the live adapters, orchestrators and aggregation services.
pub fn build_state(config: &PoseidonConfig, points: PointSets) -> Result<AppState> {
    let http = build_http_client(config.call_timeout())?;

    let kma = Arc::new(KmaClient::new(
        http.clone(),
        &config.upstream.kma_service_key,
        config.upstream.kma_base_url.clone(),
        config.upstream.asos_base_url.clone(),
    ));
    let airkorea = Arc::new(AirKoreaClient::new(
        http,
        &config.upstream.airkorea_service_key,
        config.upstream.airkorea_base_url.clone(),
    ));

    let ground_observation: Arc<dyn SourceClient> = Arc::new(AsosSource::new(Arc::clone(&kma)));
    let nowcast: Arc<dyn SourceClient> = Arc::new(NowcastSource::new(Arc::clone(&kma)));
    let short_forecast: Arc<dyn SourceClient> =
        Arc::new(ShortForecastSource::new(Arc::clone(&kma)));
    let village_forecast: Arc<dyn SourceClient> =
        Arc::new(VillageForecastSource::new(Arc::clone(&kma)));
    let air_quality: Arc<dyn SourceClient> =
        Arc::new(AirQualitySource::new(Arc::clone(&airkorea)));

    // One bucket for every upstream call the server makes
    let throttle = Arc::new(Throttle::new(config.throttle_interval(), 1));
    let baselines = Arc::new(StaticBaselines::default());

    let weather_orchestrator = FallbackOrchestrator::new(
        vec![Arc::clone(&ground_observation), Arc::clone(&nowcast)],
        SyntheticGenerator::new(SyntheticKind::Weather, baselines.clone()),
    )
    .with_call_timeout(config.call_timeout())
    .with_throttle(Arc::clone(&throttle));

    let air_orchestrator = FallbackOrchestrator::new(
        vec![Arc::clone(&air_quality)],
        SyntheticGenerator::new(SyntheticKind::AirQuality, baselines),
    )
    .with_call_timeout(config.call_timeout())
    .with_throttle(throttle);

    let weather_points =
        AggregationService::new(points.weather, Arc::new(weather_orchestrator))?
            .with_max_concurrency(config.aggregation.max_concurrency);
    let air_stations = AggregationService::new(points.air_quality, Arc::new(air_orchestrator))?
        .with_max_concurrency(config.aggregation.max_concurrency);

    Ok(AppState::new(
        weather_points,
        air_stations,
        nowcast,
        short_forecast,
        village_forecast,
        ground_observation,
        air_quality,
        airkorea,
    ))
}

/// The served application: API routes plus CORS and request tracing.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api::router_with_lookup_timeout(state, LOOKUP_TIMEOUT)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run(port: u16, state: Arc<AppState>) -> Result<()> {
    let app = app(Arc::clone(&state));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Web server running at http://localhost:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
    state.begin_shutdown();
}
