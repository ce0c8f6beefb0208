use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::decode::timestamp;

/// Envelope returned by `GET /device`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeviceResponse {
    pub result_list: Vec<DeviceRecord>,
}

/// A tracked vehicle as reported by the fleet API.
///
/// Records are rebuilt from scratch on every successful fetch and never
/// mutated afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub device_id: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub delivered_at: Option<DateTime<Utc>>,
    pub factory_id: String,
    pub active_state: String,
    pub display_name: String,
    pub make: String,
    pub model: String,
    #[serde(default)]
    pub conn_data: Option<ConnData>,
    #[serde(default)]
    pub settings: Option<Settings>,
    #[serde(default)]
    pub user_id_list: Vec<String>,
    pub online: bool,
    /// Most recent point, possibly noisy.
    #[serde(default)]
    pub latest_device_point: Option<TelemetryPoint>,
    /// Most recent point that passed server-side accuracy filtering.
    #[serde(default)]
    pub latest_accurate_device_point: Option<TelemetryPoint>,
}

impl DeviceRecord {
    /// Speed of the latest (not necessarily accurate) point, zero when unknown.
    pub fn latest_speed(&self) -> f64 {
        self.latest_device_point.as_ref().map_or(0.0, |p| p.speed)
    }

    /// Server timestamp of the latest point.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.latest_device_point.as_ref().map(|p| p.dt_server)
    }

    /// Drive state carried by the latest accurate point.
    pub fn accurate_drive_state(&self) -> Option<&DriveState> {
        self.latest_accurate_device_point
            .as_ref()
            .and_then(|p| p.device_state.as_ref())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnData {
    #[serde(default, with = "timestamp::option")]
    pub calamp_next_lookup_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub calamp_ipr_omega_fee_paid: bool,
    #[serde(default)]
    pub is_on_ctc: bool,
}

/// A single timestamped observation from the tracker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TelemetryPoint {
    #[serde(default)]
    pub device_point_id: String,
    #[serde(with = "timestamp")]
    pub dt_server: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub dt_tracker: DateTime<Utc>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Heading in degrees, sent as `angle`.
    #[serde(default, rename = "angle")]
    pub heading: Option<i32>,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub params: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub device_point_detail: Option<PointDetail>,
    #[serde(default)]
    pub device_state: Option<DriveState>,
    #[serde(default)]
    pub device_state_stale: Option<bool>,
    #[serde(default)]
    pub sequence: String,
}

impl TelemetryPoint {
    /// `(lat, lng)` when both are present.
    pub fn coordinate(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lng?))
    }
}

/// Server-derived drive state and accumulated counters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DriveState {
    pub drive_status: Option<String>,
    pub drive_status_id: Option<String>,
    pub drive_status_duration: Option<ValueUnitDisplay>,
    pub drive_status_distance: Option<ValueUnitDisplay>,
    pub drive_status_lat_lng_distance: Option<ValueUnitDisplay>,
    #[serde(with = "timestamp::option")]
    pub drive_status_begin_time: Option<DateTime<Utc>>,
    pub best_distance_delta: Option<ValueUnitDisplay>,
    pub is_new_drive_status: Option<bool>,
    pub adjusted_lat_lng: Option<LatLng>,
    pub beyond_max_drift_distance: Option<bool>,
    pub prev_drive_status_duration: Option<ValueUnitDisplay>,
    pub prev_drive_status_distance: Option<ValueUnitDisplay>,
    pub prev_drive_status_lat_lng_distance: Option<ValueUnitDisplay>,
    #[serde(with = "timestamp::option")]
    pub prev_drive_status_begin_time: Option<DateTime<Utc>>,
    pub prev_adjusted_lat_lng: Option<LatLng>,
    pub inaccurate_per_device_settings: Option<bool>,
    pub fuel_percent: Option<f64>,
    pub software_odometer: Option<ValueUnitDisplay>,
    #[serde(with = "timestamp::option")]
    pub last_software_odometer_reading_time: Option<DateTime<Utc>>,
    pub odometer: Option<ValueUnitDisplay>,
    pub vin: Option<String>,
    pub is_vin_from_device_point: Option<bool>,
    pub counter_list: Option<Vec<Counter>>,
}

/// Named time-based counter such as engine hours.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Counter {
    pub key: String,
    pub val: f64,
    #[serde(default)]
    pub offset: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ValueUnitDisplay {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub display: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct LatLng {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct PointDetail {
    pub factory_id: Option<String>,
    #[serde(with = "timestamp::option")]
    pub transmit_time: Option<DateTime<Utc>>,
    #[serde(with = "timestamp::option")]
    pub gps_time: Option<DateTime<Utc>>,
    pub acc: Option<bool>,
    pub lat_lng: Option<LatLng>,
    pub altitude: Option<ValueUnitDisplay>,
    pub speed: Option<ValueUnitDisplay>,
    pub heading: Option<i32>,
    pub hdop: Option<f64>,
    pub num_satellites: Option<i32>,
    pub remote_addr: Option<String>,
    pub hevent_list: Option<Vec<Event>>,
    pub dtc_list: Option<Vec<String>>,
    pub motion_log: Option<MotionLog>,
    pub packet_sequence_id: Option<String>,
    pub rssi: Option<f64>,
    pub trip_distance: Option<ValueUnitDisplay>,
    pub travel_distance: Option<ValueUnitDisplay>,
    pub external_volt: Option<f64>,
    pub backup_battery_volt: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Event {
    #[serde(default)]
    pub hevent_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct MotionLog {
    #[serde(with = "timestamp::option")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(with = "timestamp::option")]
    pub end_time: Option<DateTime<Utc>>,
    pub start_heading: Option<i32>,
    pub end_heading: Option<i32>,
    pub max_accelerating_force: Option<ValueUnitDisplay>,
    pub max_decelerating_force: Option<ValueUnitDisplay>,
    pub max_right_turn_force: Option<ValueUnitDisplay>,
    pub max_left_turn_force: Option<ValueUnitDisplay>,
}

/// Per-device thresholds. Carried through untouched; nothing in the
/// pipeline interprets them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub begin_moving_speed: Option<ValueUnitDisplay>,
    pub begin_stopped_speed: Option<ValueUnitDisplay>,
    pub max_drift_distance: Option<ValueUnitDisplay>,
    pub min_num_satellites: Option<i32>,
    pub ignore_unset_min_num_sats: Option<bool>,
    pub max_hdop: Option<f64>,
    pub drive_timeout: Option<ValueUnitDisplay>,
    pub stop_timeout: Option<ValueUnitDisplay>,
    pub offline_timeout: Option<ValueUnitDisplay>,
    pub history_calc_duration: Option<ValueUnitDisplay>,
    pub fuel_consumption: Option<FuelConsumption>,
    pub engine_hours_counter_config: Option<String>,
    #[serde(rename = "use_v3_engine_hours")]
    pub use_v3_engine_hours: Option<bool>,
    pub history_retention_days: Option<i32>,
    pub harsh_event_min_speed: Option<ValueUnitDisplay>,
    pub speed_sources_trusted: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct FuelConsumption {
    pub calculation_method: Option<String>,
    pub measurement: Option<String>,
    pub fuel_type: Option<String>,
    pub fuel_cost: Option<f64>,
    pub fuel_economy: Option<f64>,
}
