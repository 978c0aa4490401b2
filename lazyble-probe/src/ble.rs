//! BLE client for observing lazyble peripherals
//!
//! Provides functions to scan for, inspect, and watch a lazyble device, and
//! to wait for its dynamic service to show up in the advertisement.

use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use uuid::Uuid;

use lazyble_proto::ble::{
    ALL_SERVICES, DEVICE_NAME, SERVICE_3_UUID, service_name, uuid16_to_u128,
};

/// Seconds to scan before giving up on finding a device
pub const FIND_SCAN_SECS: u64 = 5;

/// A discovered device, as seen in its advertisement
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_lazyble: bool,
    /// Known lazyble services in the advertisement, by name
    pub services: Vec<String>,
    /// Whether the lazily activated service is advertised
    pub dynamic_active: bool,
}

/// One characteristic read during `inspect`
#[derive(Debug, Clone, Serialize)]
pub struct CharacteristicReport {
    pub service: String,
    pub characteristic: String,
    pub properties: String,
    /// UTF-8 (lossy) value, if the read succeeded
    pub value: Option<String>,
    /// Why the read failed; encrypted characteristics fail until paired
    pub error: Option<String>,
}

/// A notification received during `watch`
#[derive(Debug, Clone, Serialize)]
pub struct NotificationReport {
    pub characteristic: String,
    pub value: String,
}

/// Expand a 16-bit alias into the full Bluetooth UUID
pub fn uuid16(uuid: u16) -> Uuid {
    Uuid::from_u128(uuid16_to_u128(uuid))
}

/// The 16-bit alias of `uuid`, if it is derived from the Bluetooth base UUID
pub fn as_uuid16(uuid: &Uuid) -> Option<u16> {
    let raw = uuid.as_u128();
    let alias = (raw >> 96) as u16;
    (raw == uuid16_to_u128(alias)).then_some(alias)
}

/// Human label for a UUID: the lazyble service name, `0xNNNN`, or the full form
pub fn label(uuid: &Uuid) -> String {
    match as_uuid16(uuid) {
        Some(short) => match service_name(short) {
            Some(name) => format!("{name} (0x{short:04x})"),
            None => format!("0x{short:04x}"),
        },
        None => uuid.to_string(),
    }
}

/// Known lazyble services in an advertisement, in declaration order
pub fn advertised_services(uuids: &[Uuid]) -> Vec<u16> {
    ALL_SERVICES
        .iter()
        .copied()
        .filter(|s| uuids.contains(&uuid16(*s)))
        .collect()
}

/// Whether an advertised name belongs to a lazyble peripheral
///
/// Matches "NimBLE-Lazy" and the "nimble [NimBLE-Lazy]" form some hosts report.
pub fn is_lazyble(name: &str) -> bool {
    name == DEVICE_NAME || name.contains(&format!("[{DEVICE_NAME}"))
}

/// Whether a device matches the user's target, or any lazyble device if none
pub fn matches_target(name: &str, address: &str, target: Option<&str>) -> bool {
    match target {
        Some(t) => name.contains(t) || address.eq_ignore_ascii_case(t) || address.contains(t),
        None => is_lazyble(name),
    }
}

fn flags(props: CharPropFlags) -> String {
    let mut out = Vec::new();
    for (flag, name) in [
        (CharPropFlags::READ, "read"),
        (CharPropFlags::WRITE, "write"),
        (CharPropFlags::WRITE_WITHOUT_RESPONSE, "write-no-rsp"),
        (CharPropFlags::NOTIFY, "notify"),
        (CharPropFlags::INDICATE, "indicate"),
    ] {
        if props.contains(flag) {
            out.push(name);
        }
    }
    out.join("|")
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, Box<dyn std::error::Error>> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .ok_or_else(|| "No Bluetooth adapter found".into())
}

async fn report(peripheral: &Peripheral) -> Result<Option<DeviceReport>, Box<dyn std::error::Error>> {
    let Some(props) = peripheral.properties().await? else {
        return Ok(None);
    };
    let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
    let services = advertised_services(&props.services);

    Ok(Some(DeviceReport {
        is_lazyble: is_lazyble(&name),
        name,
        address: peripheral.address().to_string(),
        rssi: props.rssi,
        dynamic_active: services.contains(&SERVICE_3_UUID),
        services: services
            .iter()
            .map(|s| service_name(*s).unwrap_or("unknown").to_string())
            .collect(),
    }))
}

/// Scan for BLE devices
///
/// Returns every discovered device; lazyble devices have `is_lazyble = true`.
pub async fn scan(duration_secs: u64) -> Result<Vec<DeviceReport>, Box<dyn std::error::Error>> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(Duration::from_secs(duration_secs)).await;

    let mut devices = Vec::new();
    for peripheral in adapter.peripherals().await? {
        if let Some(device) = report(&peripheral).await? {
            devices.push(device);
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Find a device by name/address pattern, or any lazyble device
pub async fn find_device(target: Option<&str>) -> Result<Peripheral, Box<dyn std::error::Error>> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(Duration::from_secs(FIND_SCAN_SECS)).await;

    for peripheral in adapter.peripherals().await? {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_default();
            let addr = peripheral.address().to_string();

            if matches_target(&name, &addr, target) {
                adapter.stop_scan().await?;
                return Ok(peripheral);
            }
        }
    }

    adapter.stop_scan().await?;
    Err("No lazyble device found".into())
}

async fn connect(target: Option<&str>) -> Result<Peripheral, Box<dyn std::error::Error>> {
    let device = find_device(target).await?;
    device.connect().await?;
    device.discover_services().await?;
    Ok(device)
}

/// Connect and read every readable characteristic
///
/// Read failures are reported per characteristic; they do not abort the walk.
pub async fn inspect(
    target: Option<&str>,
) -> Result<Vec<CharacteristicReport>, Box<dyn std::error::Error>> {
    let device = connect(target).await?;

    let mut reports = Vec::new();
    for c in device.characteristics() {
        let (value, error) = if c.properties.contains(CharPropFlags::READ) {
            match device.read(&c).await {
                Ok(v) => (Some(String::from_utf8_lossy(&v).into_owned()), None),
                Err(e) => (None, Some(e.to_string())),
            }
        } else {
            (None, None)
        };

        reports.push(CharacteristicReport {
            service: label(&c.service_uuid),
            characteristic: label(&c.uuid),
            properties: flags(c.properties),
            value,
            error,
        });
    }

    let _ = device.disconnect().await;
    Ok(reports)
}

/// Subscribe to every notifiable characteristic and collect notifications
///
/// `on_notification` runs as each one arrives; the call returns after
/// `duration_secs` or when the device disconnects.
pub async fn watch(
    target: Option<&str>,
    duration_secs: u64,
    mut on_notification: impl FnMut(&NotificationReport),
) -> Result<Vec<NotificationReport>, Box<dyn std::error::Error>> {
    let device = connect(target).await?;

    let notifiable: Vec<Characteristic> = device
        .characteristics()
        .into_iter()
        .filter(|c| c.properties.contains(CharPropFlags::NOTIFY))
        .collect();
    if notifiable.is_empty() {
        let _ = device.disconnect().await;
        return Err("No notifiable characteristic found".into());
    }
    for c in &notifiable {
        device.subscribe(c).await?;
    }

    let mut stream = device.notifications().await?;
    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    let mut received = Vec::new();

    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let Ok(Some(n)) = timeout(left, stream.next()).await else {
            break;
        };
        let report = NotificationReport {
            characteristic: label(&n.uuid),
            value: String::from_utf8_lossy(&n.value).into_owned(),
        };
        on_notification(&report);
        received.push(report);
    }

    let _ = device.disconnect().await;
    Ok(received)
}

/// Scan until the target advertises the dynamic service
///
/// Returns the device report from the first advertisement that carries it.
pub async fn wait_dynamic(
    target: Option<&str>,
    timeout_secs: u64,
) -> Result<DeviceReport, Box<dyn std::error::Error>> {
    let adapter = get_adapter().await?;
    adapter.start_scan(ScanFilter::default()).await?;
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);

    while Instant::now() < deadline {
        for peripheral in adapter.peripherals().await? {
            let Some(device) = report(&peripheral).await? else {
                continue;
            };
            if device.dynamic_active && matches_target(&device.name, &device.address, target) {
                adapter.stop_scan().await?;
                return Ok(device);
            }
        }
        sleep(Duration::from_secs(1)).await;
    }

    adapter.stop_scan().await?;
    Err(format!("dynamic service not advertised within {timeout_secs}s").into())
}
