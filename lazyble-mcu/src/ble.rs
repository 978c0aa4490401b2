//! Host BLE stack and input boundaries
//!
//! The radio, link layer, pairing and the attribute server belong to the
//! host stack. MCU-specific crates implement [`HostStack`] on top of it
//! (NimBLE on ESP32) and [`TriggerInput`] on top of their GPIO driver.

use crate::BleUuid;
use crate::gatt::ServiceDef;

/// What the radio broadcasts while advertising
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvertisementData {
    pub device_name: String,
    pub scan_response: bool,
    /// Service UUIDs in payload order
    pub service_uuids: Vec<BleUuid>,
}

/// Trait for BLE host stack implementations
///
/// Every request is fire-and-forget: `Ok` means the stack accepted it,
/// not that the radio finished. Methods take `&self` because stack
/// callbacks and the poll loop share one instance.
pub trait HostStack: Send + Sync {
    /// Error type for host stack operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether the stack re-arms advertising by itself after a disconnect
    fn set_advertise_on_disconnect(&self, enabled: bool);

    /// Create a service with its characteristics, descriptors and initial values
    fn create_service(&self, service: &ServiceDef) -> Result<(), Self::Error>;

    /// Start a created service so clients can discover it
    fn start_service(&self, uuid: BleUuid) -> Result<(), Self::Error>;

    /// Replace the advertisement payload; takes effect on the running beacon
    fn set_advertisement(&self, data: &AdvertisementData) -> Result<(), Self::Error>;

    /// Start advertising with the last payload set
    fn start_advertising(&self) -> Result<(), Self::Error>;

    /// Check whether the radio is currently advertising
    fn is_advertising(&self) -> bool;
}

/// Debounced digital read of the activation button
pub trait TriggerInput {
    /// True while the button is held (the pin is active low)
    fn is_pressed(&mut self) -> bool;
}

impl<F: FnMut() -> bool> TriggerInput for F {
    fn is_pressed(&mut self) -> bool {
        self()
    }
}
