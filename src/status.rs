//! Vehicle status derived from telemetry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::DeviceRecord;

/// Operational state of a vehicle. Never stored; always recomputed from the
/// record it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleStatus {
    /// At rest, engine off or drive state unknown.
    Stopped,
    /// Driving with nonzero speed.
    Moving,
    /// Idling, or reported driving at zero speed.
    Paused,
    /// Unreachable.
    Offline,
    /// Drive state the client does not recognise.
    Unknown,
}

/// Color tokens the presentation layer maps onto its palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusColor {
    Red,
    Green,
    Orange,
    Gray,
}

impl StatusColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusColor::Red => "red",
            StatusColor::Green => "green",
            StatusColor::Orange => "orange",
            StatusColor::Gray => "gray",
        }
    }
}

impl VehicleStatus {
    pub fn title(&self) -> &'static str {
        match self {
            VehicleStatus::Stopped => "Stopped",
            VehicleStatus::Moving => "Driving",
            VehicleStatus::Paused => "Waiting",
            VehicleStatus::Offline => "Offline",
            VehicleStatus::Unknown => "Unknown",
        }
    }

    /// Symbol name of the status icon.
    pub fn icon(&self) -> &'static str {
        match self {
            VehicleStatus::Stopped => "stop.fill",
            VehicleStatus::Moving => "arrowshape.left",
            VehicleStatus::Paused => "pause.fill",
            VehicleStatus::Offline => "wifi.slash",
            VehicleStatus::Unknown => "questionmark.circle",
        }
    }

    pub fn color(&self) -> StatusColor {
        match self {
            VehicleStatus::Stopped => StatusColor::Red,
            VehicleStatus::Moving => StatusColor::Green,
            VehicleStatus::Paused => StatusColor::Orange,
            VehicleStatus::Offline | VehicleStatus::Unknown => StatusColor::Gray,
        }
    }

    /// Sort priority; higher sorts first in "most active first" order.
    pub fn priority(&self) -> i8 {
        match self {
            VehicleStatus::Unknown => -1,
            VehicleStatus::Offline => 0,
            VehicleStatus::Stopped => 1,
            VehicleStatus::Paused => 2,
            VehicleStatus::Moving => 3,
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Derives the status of a device.
///
/// Reachability wins over everything else. The drive state is read from the
/// latest accurate point while the speed comes from the latest point, which
/// may be newer.
pub fn classify(record: &DeviceRecord) -> VehicleStatus {
    if !record.online {
        return VehicleStatus::Offline;
    }

    let Some(drive_status) = record
        .accurate_drive_state()
        .and_then(|state| state.drive_status.as_deref())
    else {
        return VehicleStatus::Stopped;
    };

    match drive_status {
        "off" => VehicleStatus::Stopped,
        "idle" => VehicleStatus::Paused,
        "driving" if record.latest_speed() != 0.0 => VehicleStatus::Moving,
        "driving" => VehicleStatus::Paused,
        _ => VehicleStatus::Unknown,
    }
}

impl DeviceRecord {
    pub fn status(&self) -> VehicleStatus {
        classify(self)
    }
}
