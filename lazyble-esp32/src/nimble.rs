//! NimBLE host stack for lazyble
//!
//! Implements [`HostStack`] on top of `esp32-nimble`. Stack callbacks are
//! registered once, at service creation and in [`NimbleHost::new`], and
//! look up their handler at event time, so handlers may be bound after
//! the peripheral has created its static services.

use std::sync::{Arc, OnceLock};

use esp32_nimble::enums::{AuthReq, SecurityIOCap};
use esp32_nimble::utilities::BleUuid as NimbleUuid;
use esp32_nimble::{
    BLEAdvertisementData, BLEConnDesc, BLEDevice, DescriptorProperties, NimbleProperties,
    NimbleSub, NotifyTxStatus,
};
use log::*;

use lazyble_mcu::access::{Attribute, AttributeEvents, DeliveryStatus, SubscriptionMode};
use lazyble_mcu::ble::{AdvertisementData, HostStack};
use lazyble_mcu::connection::{ConnectionEvents, ConnectionInfo};
use lazyble_mcu::gatt::{Properties, ServiceDef};
use lazyble_mcu::{BleUuid, SecurityConfig};

#[derive(Debug, thiserror::Error)]
#[error("NimBLE: {0}")]
pub struct NimbleError(String);

impl NimbleError {
    fn from_ble(e: esp32_nimble::BLEError) -> Self {
        NimbleError(format!("{:?}", e))
    }
}

type Slot<T> = Arc<OnceLock<Arc<T>>>;

pub struct NimbleHost {
    connection_events: Slot<dyn ConnectionEvents>,
    attribute_events: Slot<dyn AttributeEvents>,
}

fn to_nimble(uuid: BleUuid) -> NimbleUuid {
    match uuid.as_u16() {
        Some(short) => NimbleUuid::from_uuid16(short),
        None => {
            // NimBLE stores 128-bit UUIDs little-endian
            let mut bytes = *uuid.to_uuid().as_bytes();
            bytes.reverse();
            NimbleUuid::from_uuid128(bytes)
        }
    }
}

fn connection_info(desc: &BLEConnDesc) -> ConnectionInfo {
    ConnectionInfo {
        handle: desc.conn_handle(),
        peer: desc.address().to_string(),
        encrypted: desc.encrypted(),
    }
}

// flag names line up with NimBLE's; names it has no counterpart for are dropped
fn characteristic_flags(props: Properties) -> NimbleProperties {
    props
        .iter_names()
        .filter_map(|(name, _)| NimbleProperties::from_name(name))
        .fold(NimbleProperties::empty(), |acc, flag| acc | flag)
}

fn descriptor_flags(props: Properties) -> DescriptorProperties {
    props
        .iter_names()
        .filter_map(|(name, _)| DescriptorProperties::from_name(name))
        .fold(DescriptorProperties::empty(), |acc, flag| acc | flag)
}

const BLE_HS_ENOTCONN: i32 = 7;
const BLE_HS_ETIMEOUT: i32 = 13;
const BLE_HS_EDONE: i32 = 14;
const BLE_HS_EUNKNOWN: i32 = 17;

/// Delivery status and the NimBLE host code behind it
///
/// esp32-nimble reports the status only. Codes NimBLE raises for a status
/// are restored; the generic failures carry `BLE_HS_EUNKNOWN`.
fn delivery(status: NotifyTxStatus) -> (DeliveryStatus, i32) {
    match status {
        NotifyTxStatus::SuccessNotify => (DeliveryStatus::SuccessNotify, 0),
        NotifyTxStatus::SuccessIndicate => (DeliveryStatus::SuccessIndicate, BLE_HS_EDONE),
        NotifyTxStatus::ErrorNotifyDisabled => (DeliveryStatus::NotifyDisabled, 0),
        NotifyTxStatus::ErrorIndicateDisabled => (DeliveryStatus::IndicateDisabled, 0),
        NotifyTxStatus::ErrorNoClient => (DeliveryStatus::NoClient, BLE_HS_ENOTCONN),
        NotifyTxStatus::ErrorIndicateTimeout => (DeliveryStatus::IndicateTimeout, BLE_HS_ETIMEOUT),
        NotifyTxStatus::ErrorIndicateFailure => (DeliveryStatus::IndicateFailure, BLE_HS_EUNKNOWN),
        NotifyTxStatus::ErrorGatt => (DeliveryStatus::Gatt, BLE_HS_EUNKNOWN),
    }
}

fn subscription(sub: NimbleSub) -> SubscriptionMode {
    let mut bits = 0;
    if sub.contains(NimbleSub::NOTIFY) {
        bits |= 1;
    }
    if sub.contains(NimbleSub::INDICATE) {
        bits |= 2;
    }
    SubscriptionMode::from_bits(bits)
}

impl NimbleHost {
    /// Take the BLE device, set its name and pairing policy, and hook the
    /// server's connection callbacks
    pub fn new(device_name: &str, security: SecurityConfig) -> Result<Self, NimbleError> {
        let device = BLEDevice::take();
        BLEDevice::set_device_name(device_name).map_err(NimbleError::from_ble)?;

        let mut auth = AuthReq::empty();
        if security.bonding {
            auth |= AuthReq::Bond;
        }
        if security.mitm {
            auth |= AuthReq::Mitm;
        }
        if security.secure_connections {
            auth |= AuthReq::Sc;
        }
        device
            .security()
            .set_auth(auth)
            .set_io_cap(SecurityIOCap::NoInputNoOutput);

        let host = Self {
            connection_events: Arc::default(),
            attribute_events: Arc::default(),
        };

        let server = device.get_server();
        let on_connect = host.connection_events.clone();
        server.on_connect(move |_server, desc| match on_connect.get() {
            Some(events) => events.on_connect(&connection_info(desc)),
            None => warn!("client {} connected before handlers were bound", desc.address()),
        });
        let on_disconnect = host.connection_events.clone();
        server.on_disconnect(move |desc, reason| {
            debug!("disconnect reason: {:?}", reason);
            if let Some(events) = on_disconnect.get() {
                events.on_disconnect(&connection_info(desc));
            }
        });

        Ok(host)
    }

    pub fn bind_connection_events(&self, events: Arc<dyn ConnectionEvents>) {
        if self.connection_events.set(events).is_err() {
            warn!("connection handler already bound");
        }
    }

    pub fn bind_attribute_events(&self, events: Arc<dyn AttributeEvents>) {
        if self.attribute_events.set(events).is_err() {
            warn!("attribute handler already bound");
        }
    }
}

impl HostStack for NimbleHost {
    type Error = NimbleError;

    fn set_advertise_on_disconnect(&self, enabled: bool) {
        BLEDevice::take()
            .get_server()
            .advertise_on_disconnect(enabled);
    }

    fn create_service(&self, def: &ServiceDef) -> Result<(), NimbleError> {
        let server = BLEDevice::take().get_server();
        let service = server.create_service(to_nimble(def.uuid));

        for c in &def.characteristics {
            let chr = service
                .lock()
                .create_characteristic(to_nimble(c.uuid), characteristic_flags(c.properties));
            let attr = Attribute::Characteristic {
                service: def.uuid,
                uuid: c.uuid,
            };

            let on_read = self.attribute_events.clone();
            let on_write = self.attribute_events.clone();
            let on_subscribe = self.attribute_events.clone();
            let on_notify_tx = self.attribute_events.clone();
            chr.lock()
                .set_value(&c.value)
                .on_read(move |value, desc| {
                    if let Some(events) = on_read.get() {
                        events.on_read(&connection_info(desc), attr, value.value());
                    }
                })
                .on_write(move |args| {
                    if let Some(events) = on_write.get() {
                        events.on_write(&connection_info(args.desc()), attr, args.recv_data());
                    }
                })
                .on_subscribe(move |_chr, desc, sub| {
                    if let Some(events) = on_subscribe.get() {
                        events.on_subscribe(&connection_info(desc), attr, subscription(sub));
                    }
                })
                .on_notify_tx(move |tx| {
                    if let Some(events) = on_notify_tx.get() {
                        let (status, code) = delivery(tx.status());
                        events.on_notify(attr);
                        events.on_status(attr, status, code);
                    }
                });

            for d in &c.descriptors {
                let dsc = chr
                    .lock()
                    .create_descriptor(to_nimble(d.uuid), descriptor_flags(d.access));
                let attr = Attribute::Descriptor {
                    characteristic: c.uuid,
                    uuid: d.uuid,
                };

                let on_read = self.attribute_events.clone();
                let on_write = self.attribute_events.clone();
                dsc.lock()
                    .set_value(&d.value)
                    .on_read(move |value, desc| {
                        if let Some(events) = on_read.get() {
                            events.on_read(&connection_info(desc), attr, value.value());
                        }
                    })
                    .on_write(move |args| {
                        if let Some(events) = on_write.get() {
                            events.on_write(&connection_info(args.desc()), attr, args.recv_data());
                        }
                    });
            }
        }

        debug!("NimBLE: created service {}", def.uuid);
        Ok(())
    }

    fn start_service(&self, uuid: BleUuid) -> Result<(), NimbleError> {
        // NimBLE registers the GATT table when advertising starts; stop it
        // so the next start picks up a service added at runtime
        let advertising = BLEDevice::take().get_advertising();
        let mut advertising = advertising.lock();
        if advertising.is_advertising() {
            advertising.stop().map_err(NimbleError::from_ble)?;
        }
        debug!("NimBLE: service {} queued for registration", uuid);
        Ok(())
    }

    fn set_advertisement(&self, data: &AdvertisementData) -> Result<(), NimbleError> {
        let mut payload = BLEAdvertisementData::new();
        payload.name(&data.device_name);
        for uuid in &data.service_uuids {
            payload.add_service_uuid(to_nimble(*uuid));
        }

        let advertising = BLEDevice::take().get_advertising();
        let mut advertising = advertising.lock();
        advertising.scan_response(data.scan_response);
        advertising.set_data(&mut payload).map_err(NimbleError::from_ble)
    }

    fn start_advertising(&self) -> Result<(), NimbleError> {
        BLEDevice::take()
            .get_advertising()
            .lock()
            .start()
            .map_err(NimbleError::from_ble)
    }

    fn is_advertising(&self) -> bool {
        BLEDevice::take().get_advertising().lock().is_advertising()
    }
}
