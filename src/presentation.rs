//! Filtering, sorting and visibility for list and map views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::status::VehicleStatus;
use crate::types::DeviceRecord;

/// Sort orders offered by the device list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOption {
    #[default]
    Name,
    Status,
    LastUpdated,
    Speed,
}

impl SortOption {
    pub const ALL: [SortOption; 4] = [
        SortOption::Name,
        SortOption::Status,
        SortOption::LastUpdated,
        SortOption::Speed,
    ];

    /// Raw value used for display and persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOption::Name => "Name",
            SortOption::Status => "Status",
            SortOption::LastUpdated => "Last Updated",
            SortOption::Speed => "Speed",
        }
    }

    /// Parses a stored value, falling back to [`SortOption::Name`].
    pub fn from_stored(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl fmt::Display for SortOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortOption::ALL
            .into_iter()
            .find(|option| option.as_str() == s)
            .ok_or_else(|| format!("unknown sort option '{}'", s))
    }
}

/// Case-insensitive substring match on display name or device id. An empty
/// query matches everything.
pub fn matches_query(record: &DeviceRecord, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    record.display_name.to_lowercase().contains(&needle) || record.device_id.to_lowercase().contains(&needle)
}

/// Sorts in place. Sorting is stable, so equal keys keep server order.
pub fn sort_devices(records: &mut [&DeviceRecord], option: SortOption) {
    match option {
        SortOption::Name => records.sort_by(|a, b| a.display_name.cmp(&b.display_name)),
        SortOption::Status => records.sort_by_key(|r| std::cmp::Reverse(r.status().priority())),
        SortOption::LastUpdated => {
            records.sort_by_key(|r| std::cmp::Reverse(r.last_update().unwrap_or(DateTime::<Utc>::MIN_UTC)))
        }
        SortOption::Speed => records.sort_by(|a, b| b.latest_speed().total_cmp(&a.latest_speed())),
    }
}

/// Device ids the user chose to hide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HiddenDevices {
    ids: BTreeSet<String>,
}

impl HiddenDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_hidden(&self, device_id: &str) -> bool {
        self.ids.contains(device_id)
    }

    /// Flips visibility; returns `true` if the device is now hidden.
    pub fn toggle(&mut self, device_id: &str) -> bool {
        if self.ids.remove(device_id) {
            false
        } else {
            self.ids.insert(device_id.to_string());
            true
        }
    }

    pub fn hide(&mut self, device_id: &str) {
        self.ids.insert(device_id.to_string());
    }

    pub fn show(&mut self, device_id: &str) {
        self.ids.remove(device_id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// JSON string array, the persisted form.
    pub fn encode(&self) -> String {
        serde_json::to_string(&self.ids).unwrap_or_else(|_| "[]".to_string())
    }

    /// Decodes the persisted form; malformed input yields an empty set.
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(ids) => Self {
                ids: ids.into_iter().collect(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed hidden device list");
                Self::default()
            }
        }
    }
}

impl<S: Into<String>> FromIterator<S> for HiddenDevices {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Devices that should be drawn on the map.
pub fn visible_devices<'a>(records: &'a [DeviceRecord], hidden: &HiddenDevices) -> Vec<&'a DeviceRecord> {
    records.iter().filter(|r| !hidden.is_hidden(&r.device_id)).collect()
}

/// One row of the device list.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRow {
    pub device_id: String,
    pub display_name: String,
    pub status: VehicleStatus,
    pub last_update: Option<DateTime<Utc>>,
    pub speed: Option<f64>,
    pub hidden: bool,
    pub status_duration: String,
}

impl DeviceRow {
    pub fn new(record: &DeviceRecord, hidden: bool, now: DateTime<Utc>) -> Self {
        Self {
            device_id: record.device_id.clone(),
            display_name: record.display_name.clone(),
            status: record.status(),
            last_update: record.last_update(),
            speed: record.latest_device_point.as_ref().map(|p| p.speed),
            hidden,
            status_duration: status_duration(record, now),
        }
    }

    pub fn speed_text(&self) -> Option<String> {
        self.speed.map(|s| format!("{:.0} km/h", s))
    }
}

/// Counts shown above the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSummary {
    pub total: usize,
    pub hidden: usize,
}

impl ListSummary {
    pub fn visible(&self) -> usize {
        self.total - self.hidden
    }
}

impl fmt::Display for ListSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Showing {} of {} devices ({} hidden)",
            self.visible(),
            self.total,
            self.hidden
        )
    }
}

/// Filtered, sorted list view. Hidden devices stay in the list so they can be
/// shown again, and are counted in the summary.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceList {
    pub rows: Vec<DeviceRow>,
    pub summary: ListSummary,
}

impl DeviceList {
    pub fn build(
        records: &[DeviceRecord],
        query: &str,
        sort: SortOption,
        hidden: &HiddenDevices,
        now: DateTime<Utc>,
    ) -> Self {
        let mut filtered: Vec<&DeviceRecord> = records.iter().filter(|r| matches_query(r, query)).collect();
        sort_devices(&mut filtered, sort);

        let rows: Vec<DeviceRow> = filtered
            .into_iter()
            .map(|r| DeviceRow::new(r, hidden.is_hidden(&r.device_id), now))
            .collect();
        let summary = ListSummary {
            total: rows.len(),
            hidden: rows.iter().filter(|row| row.hidden).count(),
        };
        Self { rows, summary }
    }
}

/// Compact elapsed time such as `"2d 3h 15m "` or `"42s"`.
///
/// Seconds are only shown when under an hour, or when nothing larger is.
pub fn format_elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let total = (now - since).num_seconds().max(0);
    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let mins = total % 3_600 / 60;
    let secs = total % 60;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{}d ", days));
    }
    if hours > 0 {
        out.push_str(&format!("{}h ", hours));
    }
    if mins > 0 {
        out.push_str(&format!("{}m ", mins));
    }
    if (days == 0 && hours == 0 && secs > 0) || days + hours + mins == 0 {
        out.push_str(&format!("{}s", secs));
    }
    out
}

/// How long the vehicle has been in its current drive status, or `"-"`.
pub fn status_duration(record: &DeviceRecord, now: DateTime<Utc>) -> String {
    record
        .accurate_drive_state()
        .and_then(|state| state.drive_status_begin_time)
        .map_or_else(|| "-".to_string(), |begin| format_elapsed(begin, now))
}

/// Map region enclosing a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapRegion {
    pub center_lat: f64,
    pub center_lng: f64,
    pub lat_delta: f64,
    pub lng_delta: f64,
}

pub const DEFAULT_REGION_PADDING: f64 = 1.2;

/// Region enclosing every device with a located latest point, scaled by
/// `padding`. `None` when no device has coordinates.
pub fn bounding_region(records: &[&DeviceRecord], padding: f64) -> Option<MapRegion> {
    let coords: Vec<(f64, f64)> = records
        .iter()
        .filter_map(|r| r.latest_device_point.as_ref()?.coordinate())
        .collect();
    let first = coords.first()?;

    let (mut min_lat, mut max_lat, mut min_lng, mut max_lng) = (first.0, first.0, first.1, first.1);
    for &(lat, lng) in &coords[1..] {
        min_lat = min_lat.min(lat);
        max_lat = max_lat.max(lat);
        min_lng = min_lng.min(lng);
        max_lng = max_lng.max(lng);
    }

    Some(MapRegion {
        center_lat: (min_lat + max_lat) / 2.0,
        center_lng: (min_lng + max_lng) / 2.0,
        lat_delta: (max_lat - min_lat) * padding,
        lng_delta: (max_lng - min_lng) * padding,
    })
}
