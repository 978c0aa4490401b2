//! lazyble protocol constants
//!
//! Configuration data of the lazyble peripheral: the declared GATT
//! surface, initial values, and the trigger wiring. Kept free of
//! dependencies so the firmware and the host tools can share it.

pub mod ble;
