//! Decoding of raw `/device` payloads into typed records.
//!
//! Decoding is a pure transform: identical bytes always produce identical
//! records, and no I/O or retry happens here.

use chrono::{DateTime, Timelike, Utc};
use thiserror::Error;

use crate::types::{DeviceRecord, DeviceResponse};

/// Decoding failures.
///
/// `decode_devices` only ever returns `Payload`: a bad timestamp inside a
/// record surfaces there too, with the `Timestamp` message and the JSON
/// position attached. `Timestamp` comes from direct [`parse_timestamp`] calls.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid date '{0}', expected ISO-8601")]
    Timestamp(String),
}

/// Decodes a `/device` response body, keeping server order.
pub fn decode_devices(bytes: &[u8]) -> Result<Vec<DeviceRecord>, DecodeError> {
    let response: DeviceResponse = serde_json::from_slice(bytes)?;
    Ok(response.result_list)
}

/// Parses an ISO-8601 timestamp, fractional seconds first, whole seconds
/// second. Results are truncated to milliseconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    parse_fractional(raw)
        .or_else(|| parse_whole_seconds(raw))
        .and_then(truncate_to_millis)
        .ok_or_else(|| DecodeError::Timestamp(raw.to_string()))
}

fn parse_fractional(raw: &str) -> Option<DateTime<Utc>> {
    if !has_fraction(raw) {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_whole_seconds(raw: &str) -> Option<DateTime<Utc>> {
    if has_fraction(raw) {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn truncate_to_millis(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
    dt.with_nanosecond(dt.nanosecond() / 1_000_000 * 1_000_000)
}

// The seconds field is always followed by '.', 'Z' or an offset sign.
fn has_fraction(raw: &str) -> bool {
    raw.split_once('T')
        .map_or(false, |(_, time)| time.contains('.'))
}

/// Serde adapter for timestamp fields.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(de::Error::custom)
    }

    /// Same as the parent module for `Option<DateTime<Utc>>`; `null` and
    /// absent fields both decode to `None`.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => crate::decode::parse_timestamp(&raw)
                    .map(Some)
                    .map_err(de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
