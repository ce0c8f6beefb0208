//! Fleet telemetry client.
//!
//! Polls the fleet-tracking API for device telemetry, derives a status for
//! each vehicle and prepares filtered, sorted device lists for display.
//!
//! ```text
//! RefreshScheduler --tick--> FleetModel --fetch--> DeviceClient --GET--> Transport
//!                                 |                     |
//!                          watch channels         decode_devices
//!                                 v
//!                    presentation::DeviceList (classify per row)
//! ```

pub mod client;
pub mod config;
pub mod decode;
pub mod endpoint;
pub mod error;
pub mod model;
pub mod presentation;
pub mod scheduler;
pub mod status;
pub mod storage;
pub mod transport;
pub mod types;

pub use client::{ApiTarget, DeviceClient, DeviceSource, RetryPolicy};
pub use config::Config;
pub use decode::{decode_devices, DecodeError};
pub use error::{FetchError, FetchResult};
pub use model::FleetModel;
pub use presentation::{DeviceList, HiddenDevices, SortOption};
pub use scheduler::RefreshScheduler;
pub use status::{classify, VehicleStatus};
pub use transport::{HttpResponse, ReqwestTransport, Transport};
pub use types::{DeviceRecord, DriveState, TelemetryPoint};
