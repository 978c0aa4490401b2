//! Advertising controller

use std::sync::{Arc, Mutex, MutexGuard};

use log::*;

use crate::ble::{AdvertisementData, HostStack};
use crate::error::HostOp;
use crate::registry::UuidRegistry;
use crate::{BleUuid, PeripheralError, Result};

/// Result of an idempotent start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Advertising was stopped and the stack accepted the start
    Started,
    /// Advertising was already running, nothing was sent to the stack
    AlreadyRunning,
}

struct AdvertisingState {
    device_name: String,
    scan_response: bool,
    registry: UuidRegistry,
}

impl AdvertisingState {
    fn payload(&self) -> AdvertisementData {
        AdvertisementData {
            device_name: self.device_name.clone(),
            scan_response: self.scan_response,
            service_uuids: self.registry.uuids().to_vec(),
        }
    }
}

/// Owns the advertised UUID set and start requests to the radio
///
/// All mutation happens under one lock, so the poll loop and stack
/// callbacks may call in concurrently.
pub struct Advertiser<H: HostStack> {
    host: Arc<H>,
    state: Mutex<AdvertisingState>,
}

impl<H: HostStack> Advertiser<H> {
    /// One-time setup: the device name is fixed for the advertiser's lifetime
    pub fn new(host: Arc<H>, device_name: &str, scan_response: bool) -> Self {
        Self {
            host,
            state: Mutex::new(AdvertisingState {
                device_name: device_name.to_string(),
                scan_response,
                registry: UuidRegistry::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, AdvertisingState> {
        // state stays consistent across a panic: every write is a single push
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add `uuid` to the broadcast payload
    ///
    /// Returns false if it was already advertised; the stack is not asked
    /// twice for the same UUID.
    pub fn add_uuid(&self, uuid: BleUuid) -> Result<bool> {
        let mut state = self.state();
        if state.registry.contains(&uuid) {
            debug!("advertising: {} already registered", uuid);
            return Ok(false);
        }

        let mut payload = state.payload();
        payload.service_uuids.push(uuid);
        self.host
            .set_advertisement(&payload)
            .map_err(|e| PeripheralError::host(HostOp::SetAdvertisement, e))?;

        let added = state.registry.try_add(uuid);
        debug_assert!(added, "registry changed under the advertiser lock");
        info!("advertising: added service {}", uuid);
        Ok(true)
    }

    /// Enable or disable the scan response
    ///
    /// Returns false if it was already in that state; nothing is sent then.
    pub fn set_scan_response(&self, enabled: bool) -> Result<bool> {
        let mut state = self.state();
        if state.scan_response == enabled {
            return Ok(false);
        }

        let mut payload = state.payload();
        payload.scan_response = enabled;
        self.host
            .set_advertisement(&payload)
            .map_err(|e| PeripheralError::host(HostOp::SetAdvertisement, e))?;
        state.scan_response = enabled;
        Ok(true)
    }

    /// Start advertising unless it is already running
    pub fn start(&self) -> Result<StartOutcome> {
        let state = self.state();
        if self.host.is_advertising() {
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.host
            .set_advertisement(&state.payload())
            .map_err(|e| PeripheralError::host(HostOp::SetAdvertisement, e))?;
        self.host
            .start_advertising()
            .map_err(|e| PeripheralError::host(HostOp::StartAdvertising, e))?;

        info!(
            "advertising started as '{}' with {} service(s)",
            state.device_name,
            state.registry.len()
        );
        Ok(StartOutcome::Started)
    }

    pub fn is_advertising(&self) -> bool {
        self.host.is_advertising()
    }

    /// Snapshot of the current payload
    pub fn advertisement(&self) -> AdvertisementData {
        self.state().payload()
    }

    /// Advertised UUIDs in payload order
    pub fn uuids(&self) -> Vec<BleUuid> {
        self.state().registry.uuids().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Advertiser, StartOutcome};
    use crate::testing::FakeHost;
    use crate::BleUuid;

    #[test]
    fn add_uuid_is_idempotent() {
        let host = Arc::new(FakeHost::default());
        let adv = Advertiser::new(host.clone(), "test", true);

        assert!(adv.add_uuid(BleUuid::from_u16(0xDEAD)).unwrap());
        assert!(!adv.add_uuid(BleUuid::from_u16(0xDEAD)).unwrap());
        assert_eq!(adv.uuids(), vec![BleUuid::from_u16(0xDEAD)]);
        assert_eq!(host.set_advertisement_calls(), 1);
    }

    #[test]
    fn start_is_idempotent() {
        let host = Arc::new(FakeHost::default());
        let adv = Advertiser::new(host.clone(), "test", true);
        adv.add_uuid(BleUuid::from_u16(0xBAAD)).unwrap();

        assert_eq!(adv.start().unwrap(), StartOutcome::Started);
        assert_eq!(adv.start().unwrap(), StartOutcome::AlreadyRunning);
        assert!(adv.is_advertising());
        assert_eq!(host.start_calls(), 1);

        let sent = host.advertisement().unwrap();
        assert_eq!(sent.device_name, "test");
        assert!(sent.scan_response);
        assert_eq!(sent.service_uuids, vec![BleUuid::from_u16(0xBAAD)]);
    }

    #[test]
    fn rejected_start_is_reported() {
        let host = Arc::new(FakeHost::default());
        host.reject_starts(true);
        let adv = Advertiser::new(host.clone(), "test", false);

        let err = adv.start().unwrap_err();
        assert!(err.is_transient());
        assert!(!adv.is_advertising());

        host.reject_starts(false);
        assert_eq!(adv.start().unwrap(), StartOutcome::Started);
    }

    #[test]
    fn rejected_payload_leaves_registry_untouched() {
        let host = Arc::new(FakeHost::default());
        host.reject_advertisement(true);
        let adv = Advertiser::new(host.clone(), "test", false);

        assert!(adv.add_uuid(BleUuid::from_u16(0xFEED)).is_err());
        assert!(adv.uuids().is_empty());

        host.reject_advertisement(false);
        assert!(adv.add_uuid(BleUuid::from_u16(0xFEED)).unwrap());
    }

    #[test]
    fn scan_response_reports_no_op() {
        let host = Arc::new(FakeHost::default());
        let adv = Advertiser::new(host.clone(), "test", true);

        assert!(!adv.set_scan_response(true).unwrap());
        assert_eq!(host.set_advertisement_calls(), 0);

        assert!(adv.set_scan_response(false).unwrap());
        assert_eq!(host.set_advertisement_calls(), 1);
        assert!(!host.advertisement().unwrap().scan_response);
        assert!(!adv.advertisement().scan_response);
    }

    #[test]
    fn rejected_scan_response_keeps_old_flag() {
        let host = Arc::new(FakeHost::default());
        host.reject_advertisement(true);
        let adv = Advertiser::new(host.clone(), "test", false);

        assert!(adv.set_scan_response(true).is_err());
        assert!(!adv.advertisement().scan_response);

        host.reject_advertisement(false);
        assert!(adv.set_scan_response(true).unwrap());
    }
}
