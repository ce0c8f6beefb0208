use anyhow::Result;
use chrono::{Local, Utc};
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use fleet_tracker::config::Config;
use fleet_tracker::presentation::{DeviceList, HiddenDevices, SortOption};
use fleet_tracker::storage::PreferenceStore;
use fleet_tracker::types::DeviceRecord;
use fleet_tracker::{DeviceClient, FleetModel, RefreshScheduler, ReqwestTransport};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if env::var("LOG_FORMAT").map_or(false, |v| v == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Applies `SORT_OPTION` and `TOGGLE_HIDDEN` (comma separated ids) to the
/// stored preferences and returns the result.
fn apply_preference_overrides(store: &PreferenceStore) -> Result<(SortOption, HiddenDevices)> {
    let mut sort = store.sort_option()?;
    if let Ok(raw) = env::var("SORT_OPTION") {
        sort = SortOption::from_stored(&raw);
        store.save_sort_option(sort)?;
    }

    let mut hidden = store.hidden_devices()?;
    if let Ok(raw) = env::var("TOGGLE_HIDDEN") {
        for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
            let now_hidden = hidden.toggle(id);
            tracing::info!(device_id = id, hidden = now_hidden, "toggled device visibility");
        }
        store.save_hidden_devices(&hidden)?;
    }
    Ok((sort, hidden))
}

fn render(records: &[DeviceRecord], query: &str, sort: SortOption, hidden: &HiddenDevices) {
    let list = DeviceList::build(records, query, sort, hidden, Utc::now());

    println!();
    println!("{}  [sorted by {}]", list.summary, sort);
    for row in &list.rows {
        let last_update = row
            .last_update
            .map(|dt| dt.with_timezone(&Local).format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "--:--:--".to_string());
        println!(
            "{} {:<24} {:<20} {:<8} {:>9} {:>10}  {}",
            if row.hidden { "-" } else { "+" },
            row.display_name,
            row.device_id,
            row.status.title(),
            last_update,
            row.speed_text().unwrap_or_default(),
            row.status_duration,
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::load()?;
    tracing::info!(
        base_url = %config.base_url,
        refresh_interval_secs = config.refresh_interval_secs,
        latest_point_only = config.latest_point_only,
        "Fleet tracker starting"
    );

    let preferences = PreferenceStore::open(&config.preferences_db)?;
    let (sort, hidden) = apply_preference_overrides(&preferences)?;
    let query = config.device_query.clone().unwrap_or_default();

    let transport = ReqwestTransport::new(config.request_timeout())?;
    let client = DeviceClient::new(transport, config.api_target())
        .with_retry_policy(config.retry_policy())
        .with_debounce(config.debounce());
    let model = FleetModel::new(Arc::new(client), config.error_clear_delay());
    let scheduler =
        RefreshScheduler::new(&model, config.refresh_interval()).with_latest_point(config.latest_point_only);

    let mut devices = model.subscribe_devices();
    let mut errors = model.subscribe_error();

    model.load_devices(config.latest_point_only).await;
    scheduler.enable();

    let initial = devices.borrow_and_update().clone();
    render(&initial, &query, sort, &hidden);

    loop {
        tokio::select! {
            changed = devices.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = devices.borrow_and_update().clone();
                render(&snapshot, &query, sort, &hidden);
            }
            changed = errors.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(message) = errors.borrow_and_update().clone() {
                    eprintln!("error: {}", message);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                scheduler.disable();
                break;
            }
        }
    }

    Ok(())
}
