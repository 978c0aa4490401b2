//! Lazyble MCU Library
//!
//! The peripheral state machine for lazyble devices, independent of any
//! particular radio.
//!
//! This crate provides:
//! - An advertiser that owns the advertised UUID set
//! - A service directory with one lazily activated service
//! - The activation trigger and connection lifecycle handlers
//! - Traits for the host BLE stack and the trigger input
//!
//! # MCU implementations
//! - ESP32 (NimBLE): see `lazyble-esp32`
//!
//! # Note
//! Nothing here blocks or spawns. The firmware owns the poll loop and
//! forwards stack callbacks to the handlers from [`Peripheral`].

pub mod access;
pub mod advertising;
pub mod ble;
pub mod connection;
pub mod directory;
mod error;
pub mod gatt;
pub mod peripheral;
pub mod registry;
pub mod trigger;
mod uuid;

#[cfg(test)]
mod testing;

pub use access::{AccessLog, Attribute, AttributeEvents, DeliveryStatus, SubscriptionMode};
pub use advertising::{Advertiser, StartOutcome};
pub use ble::{AdvertisementData, HostStack, TriggerInput};
pub use connection::{ConnectionEvents, ConnectionInfo, LifecycleHandler};
pub use directory::{ActivationState, ServiceDirectory};
pub use error::{HostOp, PeripheralError, Result};
pub use gatt::{CharacteristicDef, DescriptorDef, Properties, ServiceDef};
pub use peripheral::{Peripheral, PeripheralConfig, SecurityConfig};
pub use trigger::{ActivationTrigger, TriggerOutcome};
pub use crate::uuid::{BleUuid, ParseUuidError};
