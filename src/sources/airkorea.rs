//! Air-quality service adapters: station measurements and nearby stations.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use super::{PointQuery, SourceClient, decode_service_key, fetch_json, parse_number};
use crate::error::SourceFailure;
use crate::grid::TmCoordinate;
use crate::models::{AirQualitySnapshot, Concentrations, Reading, ReadingData, SourceLabel};

type SourceResult<T> = std::result::Result<T, SourceFailure>;

const REALTIME_PATH: &str = "ArpltnInforInqireSvc/getMsrstnAcctoRltmMesureDnsty";
const NEARBY_PATH: &str = "MsrstnInfoInqireSvc/getNearbyMsrstnList";

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
    items: Option<Vec<T>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MeasurementItem {
    data_time: Option<String>,
    station_name: Option<String>,
    pm10_value: Option<String>,
    pm25_value: Option<String>,
    so2_value: Option<String>,
    co_value: Option<String>,
    o3_value: Option<String>,
    no2_value: Option<String>,
    khai_value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationItem {
    station_name: Option<String>,
    addr: Option<String>,
    tm: Option<serde_json::Value>,
}

/// A measuring station close to a TM coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyStation {
    pub station_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    /// Distance from the query coordinate (km)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

fn unwrap_items<T>(envelope: Envelope<T>, what: &str) -> SourceResult<Vec<T>> {
    let response = envelope
        .response
        .ok_or_else(|| SourceFailure::SchemaMismatch(format!("{what}: missing response")))?;

    if let Some(header) = response.header {
        if header.result_code != "00" {
            return Err(SourceFailure::UpstreamErrorCode {
                code: header.result_code,
                message: header.result_msg,
            });
        }
    }

    let items = response
        .body
        .and_then(|body| body.items)
        .ok_or_else(|| SourceFailure::SchemaMismatch(format!("{what}: missing body.items")))?;
    if items.is_empty() {
        return Err(SourceFailure::EmptyResult(format!("{what}: no rows")));
    }
    Ok(items)
}

fn measured(raw: Option<&String>) -> Option<f64> {
    raw.and_then(|value| parse_number(value))
}

/// Turn the newest measurement row into a graded snapshot.
pub(crate) fn snapshot_from_items(
    items: &[MeasurementItem],
    station: &str,
) -> SourceResult<AirQualitySnapshot> {
    // Rows come newest first
    let item = items
        .first()
        .ok_or_else(|| SourceFailure::EmptyResult(format!("station {station}: no rows")))?;

    let concentrations = Concentrations {
        pm10: measured(item.pm10_value.as_ref()),
        pm25: measured(item.pm25_value.as_ref()),
        o3: measured(item.o3_value.as_ref()),
        no2: measured(item.no2_value.as_ref()),
        co: measured(item.co_value.as_ref()),
        so2: measured(item.so2_value.as_ref()),
    };
    if concentrations.is_empty() {
        return Err(match &item.data_time {
            Some(time) => SourceFailure::EmptyResult(format!(
                "station {station}: no pollutant measured at {time}"
            )),
            None => SourceFailure::SchemaMismatch(format!(
                "station {station}: row carries no dataTime and no values"
            )),
        });
    }

    Ok(AirQualitySnapshot::new(
        item.station_name.clone().unwrap_or_else(|| station.to_string()),
        item.data_time.clone(),
        concentrations,
        measured(item.khai_value.as_ref()),
    ))
}

fn station_from_item(item: StationItem) -> Option<NearbyStation> {
    let distance_km = match item.tm {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => parse_number(&s),
        _ => None,
    };
    Some(NearbyStation {
        station_name: item.station_name.filter(|name| !name.is_empty())?,
        addr: item.addr,
        distance_km,
    })
}

/// Client for the air-quality service
pub struct AirKoreaClient {
    http: Client,
    service_key: String,
    base_url: String,
}

impl AirKoreaClient {
    #[must_use]
    pub fn new(http: Client, service_key: &str, base_url: impl Into<String>) -> Self {
        Self {
            http,
            service_key: decode_service_key(service_key),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Latest measurement at a named station.
    #[instrument(skip(self))]
    pub async fn realtime(&self, station_name: &str) -> SourceResult<AirQualitySnapshot> {
        let start = Instant::now();
        let params = [
            ("serviceKey", self.service_key.as_str()),
            ("returnType", "json"),
            ("numOfRows", "100"),
            ("pageNo", "1"),
            ("stationName", station_name),
            ("dataTerm", "DAILY"),
            ("ver", "1.0"),
        ];
        let envelope: Envelope<MeasurementItem> = fetch_json(
            self.http.get(self.url(REALTIME_PATH)).query(&params),
            "realtime measurement",
        )
        .await?;
        let items = unwrap_items(envelope, "realtime measurement")?;
        let snapshot = snapshot_from_items(&items, station_name)?;

        info!(
            "Station {} measured at {:?} in {:.3}s",
            station_name,
            snapshot.measured_at,
            start.elapsed().as_secs_f64()
        );
        Ok(snapshot)
    }
}

/// Lookup of measuring stations around a coordinate
#[async_trait]
pub trait StationLookup: Send + Sync {
    /// Stations ordered by distance from a TM coordinate.
    async fn nearby_stations(&self, tm: TmCoordinate) -> SourceResult<Vec<NearbyStation>>;
}

#[async_trait]
impl StationLookup for AirKoreaClient {
    #[instrument(skip(self))]
    async fn nearby_stations(&self, tm: TmCoordinate) -> SourceResult<Vec<NearbyStation>> {
        let tm_x = tm.tm_x.to_string();
        let tm_y = tm.tm_y.to_string();
        let params = [
            ("serviceKey", self.service_key.as_str()),
            ("returnType", "json"),
            ("tmX", tm_x.as_str()),
            ("tmY", tm_y.as_str()),
            ("ver", "1.0"),
        ];
        let envelope: Envelope<StationItem> = fetch_json(
            self.http.get(self.url(NEARBY_PATH)).query(&params),
            "nearby stations",
        )
        .await?;
        let stations: Vec<NearbyStation> = unwrap_items(envelope, "nearby stations")?
            .into_iter()
            .filter_map(station_from_item)
            .collect();

        debug!("Found {} stations near ({}, {})", stations.len(), tm_x, tm_y);
        if stations.is_empty() {
            return Err(SourceFailure::SchemaMismatch(
                "nearby stations: no row carries a stationName".to_string(),
            ));
        }
        Ok(stations)
    }
}

/// Realtime measurement at the point's configured station
pub struct AirQualitySource {
    client: Arc<AirKoreaClient>,
}

impl AirQualitySource {
    #[must_use]
    pub fn new(client: Arc<AirKoreaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceClient for AirQualitySource {
    fn label(&self) -> SourceLabel {
        SourceLabel::AirKorea
    }

    async fn fetch(&self, query: &PointQuery) -> SourceResult<Reading> {
        let station = query
            .point
            .air_station
            .as_deref()
            .ok_or_else(|| {
                SourceFailure::EmptyResult(format!(
                    "no air-quality station configured for {}",
                    query.point.name
                ))
            })?;
        let snapshot = self.client.realtime(station).await?;
        Ok(Reading::live(
            self.label(),
            ReadingData::AirQualitySnapshot(snapshot),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grade::{Grade, Pollutant};

    fn parse(json: &str) -> SourceResult<Vec<MeasurementItem>> {
        let envelope: Envelope<MeasurementItem> = serde_json::from_str(json).unwrap();
        unwrap_items(envelope, "test")
    }

    #[test]
    fn test_snapshot_from_realtime_rows() {
        let rows = parse(
            r#"{"response":{"header":{"resultCode":"00","resultMsg":"NORMAL_CODE"},
            "body":{"totalCount":2,"items":[
                {"dataTime":"2024-01-01 15:00","pm10Value":"45","pm25Value":"40","o3Value":"0.031",
                 "no2Value":"-","coValue":"0.5","so2Value":"0.003","khaiValue":"90"},
                {"dataTime":"2024-01-01 14:00","pm10Value":"10","pm25Value":"5"}
            ],"pageNo":1,"numOfRows":100}}}"#,
        )
        .unwrap();

        let snapshot = snapshot_from_items(&rows, "Jongno-gu").unwrap();
        assert_eq!(snapshot.station_name, "Jongno-gu");
        assert_eq!(snapshot.measured_at.as_deref(), Some("2024-01-01 15:00"));
        assert_eq!(snapshot.concentrations.pm10, Some(45.0));
        assert_eq!(snapshot.concentrations.no2, None);
        assert_eq!(snapshot.khai_value, Some(90.0));
        assert_eq!(snapshot.grades.get(&Pollutant::Pm10), Some(&Grade::Moderate));
        assert_eq!(snapshot.grades.get(&Pollutant::Pm25), Some(&Grade::Unhealthy));
        assert_eq!(snapshot.overall_grade, Some(Grade::Unhealthy));
    }

    #[test]
    fn test_empty_items_is_empty_result() {
        let result = parse(
            r#"{"response":{"header":{"resultCode":"00","resultMsg":"NORMAL_CODE"},"body":{"items":[]}}}"#,
        );
        assert!(matches!(result, Err(SourceFailure::EmptyResult(_))));
    }

    #[test]
    fn test_error_code() {
        let result = parse(
            r#"{"response":{"header":{"resultCode":"22","resultMsg":"LIMITED_NUMBER_OF_SERVICE_REQUESTS_EXCEEDS_ERROR"}}}"#,
        );
        assert!(matches!(
            result,
            Err(SourceFailure::UpstreamErrorCode { ref code, .. }) if code == "22"
        ));
    }

    #[test]
    fn test_missing_items_is_schema_mismatch() {
        let result = parse(r#"{"response":{"body":{"totalCount":0}}}"#);
        assert!(result.unwrap_err().is_schema());
    }

    #[test]
    fn test_row_without_values_is_schema_mismatch() {
        let rows = vec![MeasurementItem::default()];
        assert!(snapshot_from_items(&rows, "x").unwrap_err().is_schema());
    }

    #[test]
    fn test_row_with_only_missing_values_is_empty_result() {
        let rows = parse(
            r#"{"response":{"header":{"resultCode":"00","resultMsg":"NORMAL_CODE"},
            "body":{"items":[
                {"dataTime":"2024-01-01 10:00","pm10Value":"-","pm25Value":"-","o3Value":"-",
                 "no2Value":"-","coValue":"-","so2Value":"-","khaiValue":"-"}
            ]}}}"#,
        )
        .unwrap();
        let result = snapshot_from_items(&rows, "Jongno-gu");
        assert!(matches!(result, Err(SourceFailure::EmptyResult(_))));
    }

    #[test]
    fn test_station_distance_accepts_numbers_and_strings() {
        let items: Vec<StationItem> = serde_json::from_str(
            r#"[{"stationName":"Jung-gu","addr":"Seoul Jung-gu","tm":1.2},
                {"stationName":"Jongno-gu","tm":"2.5"},
                {"addr":"nameless"}]"#,
        )
        .unwrap();
        let stations: Vec<NearbyStation> =
            items.into_iter().filter_map(station_from_item).collect();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].distance_km, Some(1.2));
        assert_eq!(stations[1].distance_km, Some(2.5));
    }
}
