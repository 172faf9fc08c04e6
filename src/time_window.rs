//! Reference "as-of" windows for each upstream data product.
//!
//! Every rule is a pure function of the provider-local wall clock (KST,
//! UTC+9) and always names a window the provider has already published.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Asia::Seoul;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hour of the previous day used for ground observations
const GROUND_OBSERVATION_HOUR: u32 = 15;
/// Hour of the previous day used for the nowcast grid
const NOWCAST_HOUR: u32 = 14;
/// Minute after which the current hour's forecast slot is published
const FORECAST_PUBLISH_MINUTE: u32 = 45;
/// Village forecast issue hours (local time)
const VILLAGE_ISSUE_HOURS: [u32; 8] = [2, 5, 8, 11, 14, 17, 20, 23];

/// Data products with distinct publication cadences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductType {
    /// Hourly ground-station observation, published about one day behind
    GroundHourlyObservation,
    /// Ultra-short-range nowcast grid
    ShortRangeNowcast,
    /// Ultra-short-range forecast grid, issued every 30 minutes
    ShortRangeForecast,
    /// Village forecast, issued eight times a day
    VillageForecast,
}

/// The reference date/time a query must use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub reference_date: NaiveDate,
    pub reference_time: NaiveTime,
}

impl TimeWindow {
    fn new(reference_date: NaiveDate, hour: u32, minute: u32) -> Self {
        Self {
            reference_date,
            reference_time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN),
        }
    }

    /// `YYYYMMDD` as the providers expect it
    #[must_use]
    pub fn date_param(&self) -> String {
        self.reference_date.format("%Y%m%d").to_string()
    }

    /// `HHMM` as the grid services expect it
    #[must_use]
    pub fn time_param(&self) -> String {
        self.reference_time.format("%H%M").to_string()
    }

    /// `HH` as the ground-observation service expects it
    #[must_use]
    pub fn hour_param(&self) -> String {
        self.reference_time.format("%H").to_string()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date_param(), self.time_param())
    }
}

/// Provider-local wall clock for an instant
#[must_use]
pub fn local_time(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&Seoul).naive_local()
}

/// Resolve the window for `product` at the given instant.
#[must_use]
pub fn resolve_at(product: ProductType, instant: DateTime<Utc>) -> TimeWindow {
    resolve(product, local_time(instant))
}

/// Resolve the window for `product` from a KST wall-clock time.
#[must_use]
pub fn resolve(product: ProductType, local: NaiveDateTime) -> TimeWindow {
    let today = local.date();
    let yesterday = today - Duration::days(1);
    let hour = local.hour();

    match product {
        ProductType::GroundHourlyObservation => {
            TimeWindow::new(yesterday, GROUND_OBSERVATION_HOUR, 0)
        }
        ProductType::ShortRangeNowcast => TimeWindow::new(yesterday, NOWCAST_HOUR, 0),
        ProductType::ShortRangeForecast => {
            if local.minute() >= FORECAST_PUBLISH_MINUTE {
                TimeWindow::new(today, hour, 30)
            } else if hour == 0 {
                TimeWindow::new(yesterday, 23, 30)
            } else {
                TimeWindow::new(today, hour - 1, 30)
            }
        }
        ProductType::VillageForecast => {
            match VILLAGE_ISSUE_HOURS.iter().rev().find(|&&h| h <= hour) {
                Some(&issue) => TimeWindow::new(today, issue, 0),
                None => TimeWindow::new(yesterday, 23, 0),
            }
        }
    }
}
