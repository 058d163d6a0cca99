//! Snapshot records and their canonical position form
//!
//! A [`RawRecord`] is whatever one snapshot entry contained. The
//! [`RecordTransformer`] turns it into a [`CanonicalPositionRecord`] without
//! ever failing: fields that are absent or cannot be coerced become `None`,
//! and the sample time always resolves through the fallback chain.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::DEFAULT_RECEIVER_ID;

/// One untyped snapshot entry, keyed by source field name
pub type RawRecord = serde_json::Map<String, Value>;

/// Timestamp layouts accepted for snapshot times, in priority order.
///
/// Input has every `Z` removed before matching; all layouts are read as UTC.
pub const TIMESTAMP_LAYOUTS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y%m%d_%H%M%S",
];

/// Source field names as written by the receiver logger
pub mod fields {
    pub const ICAO: &str = "ICAO";
    pub const IDENT: &str = "Ident";
    pub const AIRLINE: &str = "Airline";
    pub const REGISTRATION: &str = "Registration";
    pub const AIRCRAFT_TYPE: &str = "Aircraft_Type";
    pub const LATITUDE: &str = "Latitude";
    pub const LONGITUDE: &str = "Longitude";
    pub const ALTITUDE_FT: &str = "Altitude_ft";
    pub const SPEED_KT: &str = "Speed_kt";
    pub const VERTICAL_RATE_FT_MIN: &str = "Vertical_Rate_ft_min";
    pub const DISTANCE_NM: &str = "Distance_NM";
    pub const HEADING: &str = "Heading";
    pub const MESSAGES: &str = "Messages";
    pub const RSSI: &str = "RSSI";
    pub const AGE: &str = "Age";
    pub const DATA_QUALITY: &str = "Data_Quality";
    pub const POSITION_TIME: &str = "Position_Time";
    pub const FIRST_SEEN: &str = "First_Seen";
    pub const LAST_SEEN: &str = "Last_Seen";
}

/// A normalized aircraft position sample, the unit of storage
///
/// `(icao, time)` is the storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPositionRecord {
    pub time: DateTime<Utc>,
    pub icao: String,
    pub flight: Option<String>,
    pub airline: Option<String>,
    pub registration: Option<String>,
    pub aircraft_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_ft: Option<i32>,
    pub speed_kt: Option<i32>,
    pub vertical_rate_ft_min: Option<i32>,
    pub distance_nm: Option<f64>,
    pub heading: Option<f64>,
    pub messages: Option<i32>,
    pub rssi: Option<f64>,
    pub age: Option<f64>,
    pub data_quality: Option<String>,
    pub receiver_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl CanonicalPositionRecord {
    /// A record with only the key set; every optional field is `None`
    pub fn new(icao: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            time,
            icao: icao.into(),
            flight: None,
            airline: None,
            registration: None,
            aircraft_type: None,
            latitude: None,
            longitude: None,
            altitude_ft: None,
            speed_kt: None,
            vertical_rate_ft_min: None,
            distance_nm: None,
            heading: None,
            messages: None,
            rssi: None,
            age: None,
            data_quality: None,
            receiver_id: DEFAULT_RECEIVER_ID.to_string(),
            first_seen: time,
            last_seen: time,
        }
    }

    /// The storage key
    pub fn key(&self) -> (&str, DateTime<Utc>) {
        (self.icao.as_str(), self.time)
    }
}

/// Maps raw snapshot entries onto canonical records
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    receiver_id: String,
}

impl Default for RecordTransformer {
    fn default() -> Self {
        Self::new(DEFAULT_RECEIVER_ID)
    }
}

impl RecordTransformer {
    /// Create a transformer that stamps records with the given receiver id
    pub fn new(receiver_id: impl Into<String>) -> Self {
        Self {
            receiver_id: receiver_id.into(),
        }
    }

    /// Transform a raw record, falling back to the current time when the
    /// record carries no usable timestamp.
    ///
    /// Always returns `Some`; the `Option` leaves room for records that cannot
    /// be attributed to an aircraft at all.
    pub fn transform(&self, raw: &RawRecord) -> Option<CanonicalPositionRecord> {
        self.transform_at(raw, Utc::now())
    }

    /// Transform a raw record using `now` as the last-resort sample time
    pub fn transform_at(
        &self,
        raw: &RawRecord,
        now: DateTime<Utc>,
    ) -> Option<CanonicalPositionRecord> {
        let time = timestamp_field(raw, fields::POSITION_TIME)
            .or_else(|| timestamp_field(raw, fields::LAST_SEEN))
            .unwrap_or(now);

        let first_seen = timestamp_field(raw, fields::FIRST_SEEN).unwrap_or(time);
        let last_seen = timestamp_field(raw, fields::LAST_SEEN).unwrap_or(time);

        Some(CanonicalPositionRecord {
            time,
            icao: coerce_string(raw.get(fields::ICAO)).unwrap_or_default(),
            flight: non_empty(coerce_string(raw.get(fields::IDENT))),
            airline: non_empty(coerce_string(raw.get(fields::AIRLINE))),
            registration: non_empty(coerce_string(raw.get(fields::REGISTRATION))),
            aircraft_type: non_empty(coerce_string(raw.get(fields::AIRCRAFT_TYPE))),
            latitude: coerce_f64(raw.get(fields::LATITUDE)),
            longitude: coerce_f64(raw.get(fields::LONGITUDE)),
            altitude_ft: coerce_i32(raw.get(fields::ALTITUDE_FT)),
            speed_kt: coerce_i32(raw.get(fields::SPEED_KT)),
            vertical_rate_ft_min: coerce_i32(raw.get(fields::VERTICAL_RATE_FT_MIN)),
            distance_nm: coerce_f64(raw.get(fields::DISTANCE_NM)),
            heading: coerce_f64(raw.get(fields::HEADING)),
            messages: coerce_i32(raw.get(fields::MESSAGES)),
            rssi: coerce_f64(raw.get(fields::RSSI)),
            age: coerce_f64(raw.get(fields::AGE)),
            data_quality: non_empty(coerce_string(raw.get(fields::DATA_QUALITY))),
            receiver_id: self.receiver_id.clone(),
            first_seen,
            last_seen,
        })
    }
}

/// Parse a snapshot timestamp against [`TIMESTAMP_LAYOUTS`], first match wins
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let cleaned = value.trim().replace('Z', "");
    if cleaned.is_empty() {
        return None;
    }

    TIMESTAMP_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(&cleaned, layout).ok())
        .map(|naive| naive.and_utc())
}

fn timestamp_field(raw: &RawRecord, field: &str) -> Option<DateTime<Utc>> {
    match raw.get(field) {
        Some(Value::String(s)) => parse_timestamp(s),
        _ => None,
    }
}

/// Coerce a JSON value to a trimmed string; scalars are stringified
fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Coerce to a finite float
fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Coerce to an `i32`.
///
/// Integral strings parse; fractional strings do not. Fractional JSON numbers
/// truncate toward zero.
fn coerce_i32(value: Option<&Value>) -> Option<i32> {
    let wide = match value? {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i),
            None => n
                .as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64),
        },
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    wide.and_then(|i| i32::try_from(i).ok())
}
