use std::sync::Arc;

use anyhow::Result;
use poseidon::config::PoseidonConfig;
use poseidon::points::PointSets;
use poseidon::web;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

fn init_tracing(config: &PoseidonConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = fmt().with_env_filter(filter).with_target(true);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = PoseidonConfig::load()?;
    init_tracing(&config);

    info!("Starting Poseidon {}", poseidon::VERSION);

    let points = PointSets::load_or_default(config.aggregation.points_file.as_deref())?;
    info!(
        "Serving {} weather points and {} air-quality stations",
        points.weather.len(),
        points.air_quality.len()
    );

    let state = Arc::new(web::build_state(&config, points)?);
    web::run(config.server.port, state).await
}
