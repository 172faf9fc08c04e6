//! Weather service adapters: ground observations and the forecast grid.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::{PointQuery, SourceClient, decode_service_key, fetch_json, parse_number};
use crate::error::SourceFailure;
use crate::grade::RainfallLevel;
use crate::grid::GridCoordinate;
use crate::models::{
    ForecastSlot, GridForecastSeries, GridNowcast, GroundObservation, Reading, ReadingData,
    SourceLabel,
};
use crate::time_window::{self, ProductType, TimeWindow};

type SourceResult<T> = std::result::Result<T, SourceFailure>;

const RESULT_OK: &str = "00";
const RESULT_NO_DATA: &str = "03";
/// Village forecasts are trimmed to one day of slots
const VILLAGE_SLOT_LIMIT: usize = 24;

/// Grid service operations
pub const OP_NOWCAST: &str = "getUltraSrtNcst";
pub const OP_SHORT_FORECAST: &str = "getUltraSrtFcst";
pub const OP_VILLAGE_FORECAST: &str = "getVilageFcst";

// --- wire format -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<ResponseEnvelope<T>>,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope<T> {
    header: Option<Header>,
    body: Option<Body<T>>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(rename = "resultCode")]
    result_code: String,
    #[serde(rename = "resultMsg", default)]
    result_msg: String,
}

#[derive(Debug, Deserialize)]
struct Body<T> {
    items: Option<ItemsField<T>>,
}

/// The service sends `"items": ""` instead of an object when it has no rows.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemsField<T> {
    Items {
        #[serde(default = "Vec::new")]
        item: Vec<T>,
    },
    Blank(String),
}

/// Values arrive as strings most of the time, numbers some of the time.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawValue {
    Text(String),
    Number(f64),
}

impl RawValue {
    fn number(&self) -> Option<f64> {
        match self {
            RawValue::Text(text) => parse_number(text),
            RawValue::Number(n) => Some(*n),
        }
    }

    /// Precipitation amounts use `강수없음` ("no precipitation") for zero.
    fn precipitation(&self) -> Option<f64> {
        match self {
            RawValue::Text(text) if text.contains("없음") => Some(0.0),
            other => other.number(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GridItem {
    category: String,
    #[serde(rename = "fcstDate")]
    fcst_date: Option<String>,
    #[serde(rename = "fcstTime")]
    fcst_time: Option<String>,
    #[serde(rename = "obsrValue")]
    obsr_value: Option<RawValue>,
    #[serde(rename = "fcstValue")]
    fcst_value: Option<RawValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AsosItem {
    tm: Option<String>,
    #[serde(rename = "stnId")]
    stn_id: Option<String>,
    ta: Option<RawValue>,
    rn: Option<RawValue>,
    hm: Option<RawValue>,
    ws: Option<RawValue>,
}

fn unwrap_items<T>(envelope: Envelope<T>, what: &str) -> SourceResult<Vec<T>> {
    let response = envelope
        .response
        .ok_or_else(|| SourceFailure::SchemaMismatch(format!("{what}: missing response")))?;

    let header = response
        .header
        .ok_or_else(|| SourceFailure::SchemaMismatch(format!("{what}: missing header")))?;
    match header.result_code.as_str() {
        RESULT_OK => {}
        RESULT_NO_DATA => {
            return Err(SourceFailure::EmptyResult(format!(
                "{what}: {}",
                header.result_msg
            )));
        }
        code => {
            return Err(SourceFailure::UpstreamErrorCode {
                code: code.to_string(),
                message: header.result_msg,
            });
        }
    }

    let body = response
        .body
        .ok_or_else(|| SourceFailure::SchemaMismatch(format!("{what}: missing body")))?;
    match body.items {
        None => Err(SourceFailure::SchemaMismatch(format!("{what}: missing items"))),
        Some(ItemsField::Blank(raw)) if raw.trim().is_empty() => {
            Err(SourceFailure::EmptyResult(format!("{what}: no rows")))
        }
        Some(ItemsField::Blank(raw)) => Err(SourceFailure::SchemaMismatch(format!(
            "{what}: unexpected items value {raw:?}"
        ))),
        Some(ItemsField::Items { item }) if item.is_empty() => {
            Err(SourceFailure::EmptyResult(format!("{what}: no rows")))
        }
        Some(ItemsField::Items { item }) => Ok(item),
    }
}

// --- normalization ---------------------------------------------------------

pub(crate) fn nowcast_from_items(
    items: &[GridItem],
    window: TimeWindow,
    grid: GridCoordinate,
) -> SourceResult<GridNowcast> {
    let mut precipitation_mm = None;
    let mut precipitation_type = None;
    let mut temperature_c = None;
    let mut humidity_pct = None;
    let mut wind_speed_ms = None;

    for item in items {
        let value = item.obsr_value.as_ref();
        match item.category.as_str() {
            "RN1" => precipitation_mm = value.and_then(RawValue::precipitation),
            "PTY" => precipitation_type = value.and_then(RawValue::number),
            "T1H" => temperature_c = value.and_then(RawValue::number),
            "REH" => humidity_pct = value.and_then(RawValue::number),
            "WSD" => wind_speed_ms = value.and_then(RawValue::number),
            _ => {}
        }
    }

    if precipitation_mm.is_none() && precipitation_type.is_none() && temperature_c.is_none() {
        return Err(SourceFailure::SchemaMismatch(
            "nowcast: none of RN1, PTY, T1H present".to_string(),
        ));
    }

    let precipitation_mm = precipitation_mm.unwrap_or(0.0);
    Ok(GridNowcast {
        window,
        grid,
        precipitation_mm,
        precipitation_type: precipitation_type.map_or(0, |code| code as u8),
        temperature_c: temperature_c.unwrap_or(0.0),
        humidity_pct,
        wind_speed_ms,
        rainfall_level: RainfallLevel::classify(precipitation_mm),
    })
}

pub(crate) fn series_from_items(
    items: &[GridItem],
    product: ProductType,
    window: TimeWindow,
    grid: GridCoordinate,
) -> SourceResult<GridForecastSeries> {
    let mut slots: BTreeMap<NaiveDateTime, ForecastSlot> = BTreeMap::new();
    let mut skipped = 0usize;

    for item in items {
        let (Some(date), Some(time)) = (&item.fcst_date, &item.fcst_time) else {
            skipped += 1;
            continue;
        };
        let Ok(forecast_at) = NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M")
        else {
            skipped += 1;
            continue;
        };

        let slot = slots
            .entry(forecast_at)
            .or_insert_with(|| ForecastSlot::empty(forecast_at));
        let value = item.fcst_value.as_ref();
        match item.category.as_str() {
            "RN1" => slot.precipitation_mm = value.and_then(RawValue::precipitation),
            "PTY" => slot.precipitation_type = value.and_then(RawValue::number).map(|v| v as u8),
            "T1H" | "TMP" => slot.temperature_c = value.and_then(RawValue::number),
            "POP" => slot.pop = value.and_then(RawValue::number).map(|v| v as u8),
            "PCP" => slot.pcp = value.and_then(RawValue::precipitation),
            _ => {}
        }
    }

    if skipped > 0 {
        debug!("Skipped {} forecast items without a valid timestamp", skipped);
    }

    let mut series: Vec<ForecastSlot> = slots.into_values().collect();
    if product == ProductType::VillageForecast {
        series.retain(|slot| slot.pop.is_some() || slot.pcp.is_some());
        series.truncate(VILLAGE_SLOT_LIMIT);
    }

    if series.is_empty() {
        return Err(SourceFailure::SchemaMismatch(
            "forecast: no slots with a valid timestamp".to_string(),
        ));
    }

    let min_pop = series.iter().filter_map(|s| s.pop).min();
    let min_pcp = series
        .iter()
        .filter_map(|s| s.pcp)
        .filter(|pcp| *pcp >= 0.0)
        .min_by(f64::total_cmp);

    Ok(GridForecastSeries {
        product,
        window,
        grid,
        series,
        min_pop,
        min_pcp,
    })
}

pub(crate) fn observation_from_items(
    items: &[AsosItem],
    station_id: &str,
) -> SourceResult<GroundObservation> {
    let item = items
        .first()
        .ok_or_else(|| {
            SourceFailure::EmptyResult(format!("ground station {station_id}: no rows"))
        })?;

    if item.tm.is_none() && item.ta.is_none() {
        return Err(SourceFailure::SchemaMismatch(format!(
            "ground station {station_id}: row without tm or ta"
        )));
    }

    let precipitation_mm = item.rn.as_ref().and_then(RawValue::number).unwrap_or(0.0);
    Ok(GroundObservation {
        observation_station: item.stn_id.clone().unwrap_or_else(|| station_id.to_string()),
        observed_at: item.tm.clone(),
        precipitation_mm,
        precipitation_type: u8::from(precipitation_mm > 0.0),
        temperature_c: item.ta.as_ref().and_then(RawValue::number).unwrap_or(0.0),
        humidity_pct: item.hm.as_ref().and_then(RawValue::number).unwrap_or(0.0),
        wind_speed_ms: item.ws.as_ref().and_then(RawValue::number).unwrap_or(0.0),
        rainfall_level: RainfallLevel::classify(precipitation_mm),
    })
}

// --- client ----------------------------------------------------------------

/// Client for the weather service's grid and ground-observation APIs
pub struct KmaClient {
    http: Client,
    service_key: String,
    forecast_base_url: String,
    asos_base_url: String,
}

impl KmaClient {
    #[must_use]
    pub fn new(
        http: Client,
        service_key: &str,
        forecast_base_url: impl Into<String>,
        asos_base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            service_key: decode_service_key(service_key),
            forecast_base_url: forecast_base_url.into(),
            asos_base_url: asos_base_url.into(),
        }
    }

    /// Fetch raw grid rows for one operation.
    #[instrument(skip(self), fields(nx = grid.nx, ny = grid.ny))]
    pub(crate) async fn grid_items(
        &self,
        operation: &str,
        window: TimeWindow,
        grid: GridCoordinate,
    ) -> SourceResult<Vec<GridItem>> {
        let url = format!("{}/{}", self.forecast_base_url.trim_end_matches('/'), operation);
        debug!("Grid request {} for {}", url, window);
        let start = Instant::now();

        let params = [
            ("serviceKey", self.service_key.clone()),
            ("pageNo", "1".to_string()),
            ("numOfRows", "1000".to_string()),
            ("dataType", "JSON".to_string()),
            ("base_date", window.date_param()),
            ("base_time", window.time_param()),
            ("nx", grid.nx.to_string()),
            ("ny", grid.ny.to_string()),
        ];
        let envelope: Envelope<GridItem> =
            fetch_json(self.http.get(&url).query(&params), operation).await?;
        let items = unwrap_items(envelope, operation)?;

        info!(
            "{} returned {} rows in {:.3}s",
            operation,
            items.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(items)
    }

    /// Fetch raw hourly observation rows for one station.
    #[instrument(skip(self))]
    pub(crate) async fn asos_items(
        &self,
        station_id: &str,
        window: TimeWindow,
    ) -> SourceResult<Vec<AsosItem>> {
        let url = format!("{}/getWthrDataList", self.asos_base_url.trim_end_matches('/'));
        let start = Instant::now();

        let params = [
            ("serviceKey", self.service_key.clone()),
            ("pageNo", "1".to_string()),
            ("numOfRows", "999".to_string()),
            ("dataType", "JSON".to_string()),
            ("dataCd", "ASOS".to_string()),
            ("dateCd", "HR".to_string()),
            ("stnIds", station_id.to_string()),
            ("startDt", window.date_param()),
            ("startHh", window.hour_param()),
            ("endDt", window.date_param()),
            ("endHh", window.hour_param()),
        ];
        let envelope: Envelope<AsosItem> =
            fetch_json(self.http.get(&url).query(&params), "getWthrDataList").await?;
        let items = unwrap_items(envelope, "getWthrDataList")?;

        info!(
            "Ground station {} returned {} rows in {:.3}s",
            station_id,
            items.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(items)
    }
}

// --- adapters --------------------------------------------------------------

/// Hourly ground-station observation
pub struct AsosSource {
    client: Arc<KmaClient>,
}

impl AsosSource {
    #[must_use]
    pub fn new(client: Arc<KmaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceClient for AsosSource {
    fn label(&self) -> SourceLabel {
        SourceLabel::Asos
    }

    async fn fetch(&self, query: &PointQuery) -> SourceResult<Reading> {
        let Some(station_id) = query.point.station_id.as_deref() else {
            warn!("No ground station configured for {}", query.point.name);
            return Err(SourceFailure::EmptyResult(format!(
                "no ground station configured for {}",
                query.point.name
            )));
        };
        let window = time_window::resolve_at(ProductType::GroundHourlyObservation, query.now);
        let items = self.client.asos_items(station_id, window).await?;
        let observation = observation_from_items(&items, station_id)?;
        Ok(Reading::live(
            self.label(),
            ReadingData::GroundObservation(observation),
        ))
    }
}

/// Ultra-short-range nowcast for the point's grid cell
pub struct NowcastSource {
    client: Arc<KmaClient>,
}

impl NowcastSource {
    #[must_use]
    pub fn new(client: Arc<KmaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceClient for NowcastSource {
    fn label(&self) -> SourceLabel {
        SourceLabel::GridNowcast
    }

    async fn fetch(&self, query: &PointQuery) -> SourceResult<Reading> {
        let window = time_window::resolve_at(ProductType::ShortRangeNowcast, query.now);
        let items = self.client.grid_items(OP_NOWCAST, window, query.grid).await?;
        let nowcast = nowcast_from_items(&items, window, query.grid)?;
        Ok(Reading::live(self.label(), ReadingData::GridNowcast(nowcast)))
    }
}

/// Ultra-short-range forecast series (0 to +6 h)
pub struct ShortForecastSource {
    client: Arc<KmaClient>,
}

impl ShortForecastSource {
    #[must_use]
    pub fn new(client: Arc<KmaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceClient for ShortForecastSource {
    fn label(&self) -> SourceLabel {
        SourceLabel::GridForecast
    }

    async fn fetch(&self, query: &PointQuery) -> SourceResult<Reading> {
        let product = ProductType::ShortRangeForecast;
        let window = time_window::resolve_at(product, query.now);
        let items = self.client.grid_items(OP_SHORT_FORECAST, window, query.grid).await?;
        let series = series_from_items(&items, product, window, query.grid)?;
        Ok(Reading::live(
            self.label(),
            ReadingData::GridForecastSeries(series),
        ))
    }
}

/// Village forecast series with precipitation probability/amount
pub struct VillageForecastSource {
    client: Arc<KmaClient>,
}

impl VillageForecastSource {
    #[must_use]
    pub fn new(client: Arc<KmaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceClient for VillageForecastSource {
    fn label(&self) -> SourceLabel {
        SourceLabel::VillageForecast
    }

    async fn fetch(&self, query: &PointQuery) -> SourceResult<Reading> {
        let product = ProductType::VillageForecast;
        let window = time_window::resolve_at(product, query.now);
        let items = self.client.grid_items(OP_VILLAGE_FORECAST, window, query.grid).await?;
        let series = series_from_items(&items, product, window, query.grid)?;
        Ok(Reading::live(
            self.label(),
            ReadingData::GridForecastSeries(series),
        ))
    }
}
