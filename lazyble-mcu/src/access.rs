//! Attribute access observation
//!
//! The host stack owns attribute values, enforces encryption flags and
//! delivers notifications. Handlers here only watch: nothing they return
//! feeds back into advertising or activation.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::*;

use crate::connection::ConnectionInfo;
use crate::BleUuid;

/// The attribute an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Characteristic {
        service: BleUuid,
        uuid: BleUuid,
    },
    Descriptor {
        characteristic: BleUuid,
        uuid: BleUuid,
    },
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Characteristic { service, uuid } => write!(f, "{service}/{uuid}"),
            Attribute::Descriptor {
                characteristic,
                uuid,
            } => write!(f, "{characteristic}#{uuid}"),
        }
    }
}

/// Client Characteristic Configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    None = 0,
    Notify = 1,
    Indicate = 2,
    Both = 3,
}

impl SubscriptionMode {
    /// Decode the CCCD bits; bits above the two defined ones are ignored
    pub fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => SubscriptionMode::None,
            1 => SubscriptionMode::Notify,
            2 => SubscriptionMode::Indicate,
            _ => SubscriptionMode::Both,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            SubscriptionMode::None => "unsubscribed from",
            SubscriptionMode::Notify => "subscribed to notifications for",
            SubscriptionMode::Indicate => "subscribed to indications for",
            SubscriptionMode::Both => "subscribed to notifications and indications for",
        }
    }
}

/// Outcome of a notify/indicate delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    SuccessNotify,
    SuccessIndicate,
    NotifyDisabled,
    IndicateDisabled,
    NoClient,
    IndicateTimeout,
    IndicateFailure,
    Gatt,
}

impl DeliveryStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::SuccessNotify | DeliveryStatus::SuccessIndicate
        )
    }
}

/// Attribute events delivered by the host stack
///
/// For writes the stack has already stored the new value.
pub trait AttributeEvents: Send + Sync {
    fn on_read(&self, conn: &ConnectionInfo, attr: Attribute, value: &[u8]);
    fn on_write(&self, conn: &ConnectionInfo, attr: Attribute, value: &[u8]);
    fn on_subscribe(&self, conn: &ConnectionInfo, attr: Attribute, mode: SubscriptionMode);
    fn on_notify(&self, attr: Attribute);
    fn on_status(&self, attr: Attribute, status: DeliveryStatus, code: i32);
}

/// Diagnostic counters
#[derive(Debug, Default)]
pub struct AccessStats {
    pub reads: AtomicU32,
    pub writes: AtomicU32,
    pub notifications: AtomicU32,
    pub failed_deliveries: AtomicU32,
}

/// Logs every access and tracks subscriptions
///
/// Failed deliveries are logged, never retried.
#[derive(Debug, Default)]
pub struct AccessLog {
    subscriptions: Mutex<HashMap<(u16, Attribute), SubscriptionMode>>,
    stats: AccessStats,
}

impl AccessLog {
    fn subscriptions(&self) -> MutexGuard<'_, HashMap<(u16, Attribute), SubscriptionMode>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stats(&self) -> &AccessStats {
        &self.stats
    }

    pub fn subscription(&self, handle: u16, attr: Attribute) -> SubscriptionMode {
        self.subscriptions()
            .get(&(handle, attr))
            .copied()
            .unwrap_or(SubscriptionMode::None)
    }

    /// Connection handles subscribed to `attr`, ascending
    pub fn subscribers(&self, attr: Attribute) -> Vec<u16> {
        let mut handles: Vec<u16> = self
            .subscriptions()
            .keys()
            .filter(|(_, a)| *a == attr)
            .map(|(h, _)| *h)
            .collect();
        handles.sort_unstable();
        handles
    }
}

impl AttributeEvents for AccessLog {
    fn on_read(&self, conn: &ConnectionInfo, attr: Attribute, value: &[u8]) {
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        info!(
            "{}: read by {}, value: {}",
            attr,
            conn.handle,
            String::from_utf8_lossy(value)
        );
    }

    fn on_write(&self, conn: &ConnectionInfo, attr: Attribute, value: &[u8]) {
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        info!(
            "{}: written by {}, value: {}",
            attr,
            conn.handle,
            String::from_utf8_lossy(value)
        );
    }

    fn on_subscribe(&self, conn: &ConnectionInfo, attr: Attribute, mode: SubscriptionMode) {
        info!(
            "client {} address {} {} {}",
            conn.handle,
            conn.peer,
            mode.describe(),
            attr
        );
        let mut subs = self.subscriptions();
        match mode {
            SubscriptionMode::None => subs.remove(&(conn.handle, attr)),
            _ => subs.insert((conn.handle, attr), mode),
        };
    }

    fn on_notify(&self, attr: Attribute) {
        self.stats.notifications.fetch_add(1, Ordering::Relaxed);
        info!("{}: sending notification to clients", attr);
    }

    fn on_status(&self, attr: Attribute, status: DeliveryStatus, code: i32) {
        if status.is_success() {
            debug!("{}: delivery {:?}, code {}", attr, status, code);
            return;
        }
        self.stats.failed_deliveries.fetch_add(1, Ordering::Relaxed);
        warn!(
            "{}: notification/indication status {:?}, return code {}, {}",
            attr,
            status,
            code,
            return_code_name(code)
        );
    }
}

/// Symbolic name of a NimBLE host return code
pub fn return_code_name(code: i32) -> String {
    const HS: [&str; 32] = [
        "success",
        "BLE_HS_EAGAIN",
        "BLE_HS_EALREADY",
        "BLE_HS_EINVAL",
        "BLE_HS_EMSGSIZE",
        "BLE_HS_ENOENT",
        "BLE_HS_ENOMEM",
        "BLE_HS_ENOTCONN",
        "BLE_HS_ENOTSUP",
        "BLE_HS_EAPP",
        "BLE_HS_EBADDATA",
        "BLE_HS_EOS",
        "BLE_HS_ECONTROLLER",
        "BLE_HS_ETIMEOUT",
        "BLE_HS_EDONE",
        "BLE_HS_EBUSY",
        "BLE_HS_EREJECT",
        "BLE_HS_EUNKNOWN",
        "BLE_HS_EROLE",
        "BLE_HS_ETIMEOUT_HCI",
        "BLE_HS_ENOMEM_EVT",
        "BLE_HS_ENOADDR",
        "BLE_HS_ENOTSYNCED",
        "BLE_HS_EAUTHEN",
        "BLE_HS_EAUTHOR",
        "BLE_HS_EENCRYPT",
        "BLE_HS_EENCRYPT_KEY_SZ",
        "BLE_HS_ESTORE_CAP",
        "BLE_HS_ESTORE_FAIL",
        "BLE_HS_EPREEMPTED",
        "BLE_HS_EDISABLED",
        "BLE_HS_ESTALLED",
    ];

    match code {
        0..=31 => HS[code as usize].to_string(),
        0x100..=0x1ff => format!("ATT error 0x{:02x}", code - 0x100),
        _ => format!("unknown return code {code}"),
    }
}
