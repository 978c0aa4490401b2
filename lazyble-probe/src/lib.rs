//! Lazyble Probe
//!
//! BLE client that observes a lazyble peripheral from the outside: what it
//! advertises, what its characteristics hold, and when the lazily activated
//! service appears.
//!
//! # Example
//!
//! ```ignore
//! use lazyble_probe::ble;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Scan for devices
//!     for device in ble::scan(5).await? {
//!         println!("{} ({}) {:?}", device.name, device.address, device.services);
//!     }
//!
//!     // Block until someone presses the button
//!     let device = ble::wait_dynamic(None, 60).await?;
//!     println!("{} now advertises {:?}", device.name, device.services);
//!
//!     Ok(())
//! }
//! ```

pub mod ble;
