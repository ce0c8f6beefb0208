//! End-to-end: real reqwest transport against a local HTTP stub.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use fleet_tracker::presentation::{DeviceList, HiddenDevices, SortOption};
use fleet_tracker::{
    ApiTarget, DeviceClient, FetchError, FleetModel, RefreshScheduler, ReqwestTransport, RetryPolicy,
    VehicleStatus,
};

const DEVICES: &str = r#"{"result_list": [
    {
        "device_id": "moving-1", "display_name": "Courier",
        "created_at": "2025-04-30T08:00:00Z", "updated_at": "2025-05-05T10:00:00.123Z",
        "factory_id": "F1", "active_state": "active", "make": "VW", "model": "Crafter",
        "online": true,
        "latest_device_point": {"dt_server": "2025-05-05T10:00:00.500Z", "dt_tracker": "2025-05-05T10:00:00Z", "lat": 1.0, "lng": 2.0, "speed": 55.0},
        "latest_accurate_device_point": {"dt_server": "2025-05-05T09:59:50Z", "dt_tracker": "2025-05-05T09:59:50Z",
            "device_state": {"drive_status": "driving", "drive_status_begin_time": "2025-05-05T09:00:00Z"}}
    },
    {
        "device_id": "offline-1", "display_name": "Backup Van",
        "created_at": "2025-04-30T08:00:00Z", "updated_at": "2025-04-30T08:00:00Z",
        "factory_id": "F2", "active_state": "active", "make": "", "model": "",
        "online": false
    },
    {
        "device_id": "idle-1", "display_name": "Box Truck",
        "created_at": "2025-04-30T08:00:00Z", "updated_at": "2025-04-30T08:00:00Z",
        "factory_id": "F3", "active_state": "active", "make": "", "model": "",
        "online": true, "unexpected_server_field": 42,
        "latest_accurate_device_point": {"dt_server": "2025-05-05T09:00:00Z", "dt_tracker": "2025-05-05T09:00:00Z",
            "device_state": {"drive_status": "idle"}}
    }
]}"#;

/// Minimal HTTP/1.1 server replaying `(status, body)` pairs, then 200 with
/// the device payload.
struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

async fn serve(script: Vec<(u16, &'static str)>) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let script = Arc::new(Mutex::new(VecDeque::from(script)));

    let seen = requests.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf[read..]).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => read += n,
                }
            }
            let request = String::from_utf8_lossy(&buf[..read]).to_string();
            let request_line = request.lines().next().unwrap_or_default().to_string();
            seen.lock().unwrap().push(request_line);

            let (status, body) = script.lock().unwrap().pop_front().unwrap_or((200, DEVICES));
            let response = format!(
                "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    StubServer {
        base_url: format!("http://{}/v3/api/public", addr),
        requests,
    }
}

fn client_for(server: &StubServer) -> DeviceClient<ReqwestTransport> {
    let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
    DeviceClient::new(
        transport,
        ApiTarget {
            base_url: server.base_url.clone(),
            api_key: "test-key".to_string(),
        },
    )
    .with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
    })
    .with_debounce(Duration::ZERO)
}

#[tokio::test]
async fn fetch_decode_classify_and_sort() {
    let server = serve(vec![(503, "")]).await;
    let client = client_for(&server);

    let devices = client.fetch_devices(true).await.unwrap();

    let requests = server.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1],
        "GET /v3/api/public/device?api-key=test-key&latest_point=true HTTP/1.1"
    );

    let ids: Vec<&str> = devices.iter().map(|d| d.device_id.as_str()).collect();
    assert_eq!(ids, vec!["moving-1", "offline-1", "idle-1"]);
    let statuses: Vec<VehicleStatus> = devices.iter().map(|d| d.status()).collect();
    assert_eq!(
        statuses,
        vec![VehicleStatus::Moving, VehicleStatus::Offline, VehicleStatus::Paused]
    );

    let now = Utc.with_ymd_and_hms(2025, 5, 5, 10, 30, 0).unwrap();
    let hidden: HiddenDevices = ["idle-1"].into_iter().collect();
    let list = DeviceList::build(&devices, "", SortOption::Status, &hidden, now);
    let order: Vec<&str> = list.rows.iter().map(|r| r.device_id.as_str()).collect();
    assert_eq!(order, vec!["moving-1", "idle-1", "offline-1"]);
    assert_eq!(list.summary.to_string(), "Showing 2 of 3 devices (1 hidden)");
    assert_eq!(list.rows[0].status_duration, "1h 30m ");
    assert_eq!(list.rows[0].speed_text().as_deref(), Some("55 km/h"));
}

#[tokio::test]
async fn three_server_errors_surface_max_retry() {
    let server = serve(vec![(500, ""), (500, ""), (500, ""), (200, DEVICES)]).await;
    let client = client_for(&server);

    let err = client.fetch_devices(false).await.unwrap_err();

    assert!(matches!(err, FetchError::MaxRetryExceeded));
    assert_eq!(server.requests.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn malformed_payload_is_decoding_error() {
    let server = serve(vec![(200, r#"{"result_list": [{"device_id": "x"}]}"#)]).await;
    let client = client_for(&server);

    let err = client.fetch_devices(true).await.unwrap_err();

    assert!(matches!(err, FetchError::Decoding(_)));
    assert_eq!(server.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn model_keeps_last_good_list_across_failed_refresh() {
    let server = serve(vec![(200, DEVICES), (500, ""), (500, ""), (500, "")]).await;
    let model = FleetModel::new(Arc::new(client_for(&server)), Duration::from_millis(200));

    model.load_devices(true).await;
    assert_eq!(model.devices().len(), 3);
    assert!(model.error_message().is_none());

    model.load_devices(true).await;
    assert_eq!(model.devices().len(), 3);
    assert_eq!(
        model.error_message().as_deref(),
        Some("Maximum retry attempts exceeded.")
    );

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(model.error_message().is_none());
}

#[tokio::test]
async fn scheduler_refreshes_from_server() {
    let server = serve(vec![]).await;
    let model = FleetModel::new(Arc::new(client_for(&server)), Duration::from_secs(3));
    let scheduler = RefreshScheduler::new(&model, Duration::from_millis(50)).with_latest_point(false);
    let mut devices = model.subscribe_devices();

    scheduler.enable();
    tokio::time::timeout(Duration::from_secs(5), devices.changed())
        .await
        .expect("refresh within timeout")
        .unwrap();
    scheduler.disable();

    assert_eq!(model.devices().len(), 3);
    let requests = server.requests.lock().unwrap().clone();
    assert!(requests[0].contains("latest_point=false"));
}
