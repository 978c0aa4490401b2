//! In-memory host stack for tests

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::access::{Attribute, AttributeEvents};
use crate::ble::{AdvertisementData, HostStack};
use crate::connection::ConnectionInfo;
use crate::gatt::{Properties, ServiceDef};
use crate::BleUuid;

/// ATT "Insufficient Encryption"
pub const ATT_INSUFFICIENT_ENCRYPTION: u8 = 0x0F;

#[derive(Debug, thiserror::Error)]
#[error("fake host rejected {0}")]
pub struct FakeError(&'static str);

#[derive(Default)]
struct State {
    advertise_on_disconnect: Option<bool>,
    created: Vec<ServiceDef>,
    started: Vec<BleUuid>,
    values: HashMap<(BleUuid, BleUuid), Vec<u8>>,
    advertisement: Option<AdvertisementData>,
    advertising: bool,
    set_advertisement_calls: usize,
    start_calls: usize,
    reject_starts: bool,
    reject_advertisement: bool,
    fail_create: Option<BleUuid>,
}

#[derive(Default)]
pub struct FakeHost {
    state: Mutex<State>,
}

impl FakeHost {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn reject_starts(&self, reject: bool) {
        self.state().reject_starts = reject;
    }

    pub fn reject_advertisement(&self, reject: bool) {
        self.state().reject_advertisement = reject;
    }

    pub fn fail_create(&self, uuid: BleUuid) {
        self.state().fail_create = Some(uuid);
    }

    /// The radio stops advertising once a client connects
    pub fn client_connects(&self) {
        self.state().advertising = false;
    }

    pub fn advertise_on_disconnect(&self) -> Option<bool> {
        self.state().advertise_on_disconnect
    }

    pub fn advertisement(&self) -> Option<AdvertisementData> {
        self.state().advertisement.clone()
    }

    pub fn set_advertisement_calls(&self) -> usize {
        self.state().set_advertisement_calls
    }

    pub fn start_calls(&self) -> usize {
        self.state().start_calls
    }

    pub fn created_count(&self, uuid: BleUuid) -> usize {
        self.state().created.iter().filter(|s| s.uuid == uuid).count()
    }

    pub fn started_services(&self) -> Vec<BleUuid> {
        self.state().started.clone()
    }

    pub fn is_started(&self, uuid: BleUuid) -> bool {
        self.state().started.contains(&uuid)
    }

    pub fn value(&self, service: BleUuid, characteristic: BleUuid) -> Option<Vec<u8>> {
        self.state().values.get(&(service, characteristic)).cloned()
    }

    /// A client writes a characteristic, with the stack's access checks
    ///
    /// Returns the ATT error code on rejection; the callback only fires
    /// after the value is stored.
    pub fn client_write(
        &self,
        conn: &ConnectionInfo,
        service: BleUuid,
        characteristic: BleUuid,
        value: &[u8],
        events: &dyn AttributeEvents,
    ) -> Result<(), u8> {
        {
            let mut state = self.state();
            let props = state
                .created
                .iter()
                .find(|s| s.uuid == service && state.started.contains(&s.uuid))
                .and_then(|s| s.characteristic(characteristic))
                .map(|c| c.properties)
                .ok_or(0x0A_u8)?;

            if !props.contains(Properties::WRITE) {
                return Err(0x03);
            }
            if props.contains(Properties::WRITE_ENC) && !conn.encrypted {
                return Err(ATT_INSUFFICIENT_ENCRYPTION);
            }
            state
                .values
                .insert((service, characteristic), value.to_vec());
        }

        events.on_write(
            conn,
            Attribute::Characteristic {
                service,
                uuid: characteristic,
            },
            value,
        );
        Ok(())
    }
}

impl HostStack for FakeHost {
    type Error = FakeError;

    fn set_advertise_on_disconnect(&self, enabled: bool) {
        self.state().advertise_on_disconnect = Some(enabled);
    }

    fn create_service(&self, service: &ServiceDef) -> Result<(), FakeError> {
        let mut state = self.state();
        if state.fail_create == Some(service.uuid) {
            return Err(FakeError("create_service"));
        }
        for c in &service.characteristics {
            state.values.insert((service.uuid, c.uuid), c.value.clone());
        }
        state.created.push(service.clone());
        Ok(())
    }

    fn start_service(&self, uuid: BleUuid) -> Result<(), FakeError> {
        self.state().started.push(uuid);
        Ok(())
    }

    fn set_advertisement(&self, data: &AdvertisementData) -> Result<(), FakeError> {
        let mut state = self.state();
        if state.reject_advertisement {
            return Err(FakeError("set_advertisement"));
        }
        state.set_advertisement_calls += 1;
        state.advertisement = Some(data.clone());
        Ok(())
    }

    fn start_advertising(&self) -> Result<(), FakeError> {
        let mut state = self.state();
        if state.reject_starts {
            return Err(FakeError("start_advertising"));
        }
        state.start_calls += 1;
        state.advertising = true;
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        self.state().advertising
    }
}
