//! Upstream source adapters
//!
//! Each adapter wraps exactly one upstream call and returns either a
//! normalized [`Reading`] or a typed [`SourceFailure`]. Adapters never retry;
//! the fallback order lives in the orchestrator.

pub mod airkorea;
pub mod kma;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::SourceFailure;
use crate::grid::{GridCoordinate, TmCoordinate};
use crate::models::{GeoPoint, Reading, SourceLabel};

pub use airkorea::{AirKoreaClient, AirQualitySource, NearbyStation, StationLookup};
pub use kma::{AsosSource, KmaClient, NowcastSource, ShortForecastSource, VillageForecastSource};

/// Everything an adapter needs to query one point
#[derive(Debug, Clone)]
pub struct PointQuery {
    pub point: GeoPoint,
    pub grid: GridCoordinate,
    pub tm: TmCoordinate,
    pub now: DateTime<Utc>,
}

impl PointQuery {
    #[must_use]
    pub fn new(point: GeoPoint, now: DateTime<Utc>) -> Self {
        let grid = point.grid();
        let tm = point.tm();
        Self {
            point,
            grid,
            tm,
            now,
        }
    }
}

/// One upstream data source
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Label stamped on readings from this source
    fn label(&self) -> SourceLabel;

    /// Issue the single upstream call for `query`.
    async fn fetch(&self, query: &PointQuery) -> std::result::Result<Reading, SourceFailure>;
}

/// Shared HTTP client; the connection pool is reused by every adapter.
pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("Poseidon/", env!("CARGO_PKG_VERSION")))
        .build()
        .with_context(|| "Failed to create HTTP client")
}

/// Portal keys are often handed out percent-encoded; send them decoded.
#[must_use]
pub fn decode_service_key(raw: &str) -> String {
    if raw.contains('%') {
        urlencoding::decode(raw)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| raw.to_string())
    } else {
        raw.to_string()
    }
}

/// Send a request and decode its JSON body.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    request: RequestBuilder,
    what: &str,
) -> std::result::Result<T, SourceFailure> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceFailure::UpstreamUnreachable(format!("{what}: {e}")))?;

    let status = response.status();
    debug!("{} responded with {}", what, status);
    if !status.is_success() {
        return Err(SourceFailure::UpstreamUnreachable(format!(
            "{what}: HTTP {status}"
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| SourceFailure::UpstreamUnreachable(format!("{what}: {e}")))?;

    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(120).collect();
        SourceFailure::SchemaMismatch(format!("{what}: {e} (body starts with {preview:?})"))
    })
}

/// Lenient numeric parse of upstream string values.
///
/// Empty strings and `-` mean "not measured". Trailing units such as
/// `"1.5mm"` are ignored.
#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map_or(trimmed.len(), |(i, _)| i);
    trimmed[..end].parse::<f64>().ok()
}
