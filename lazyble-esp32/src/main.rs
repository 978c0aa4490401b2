//! Lazyble peripheral for ESP32
//!
//! Advertises two GATT services at boot. A third service is created the
//! first time the button on GPIO17 is held, either at boot or during the
//! poll loop, and advertising is restarted to include it.
//!
//! Observe it from a host with `lazyble-probe scan` / `lazyble-probe wait-dynamic`.

mod nimble;

use std::sync::Arc;

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{PinDriver, Pull};
use esp_idf_hal::prelude::Peripherals;
use log::*;

use lazyble_mcu::{Peripheral, PeripheralConfig, TriggerOutcome};
use lazyble_proto::ble;

use nimble::NimbleHost;

// HAL pins are typed per number, so the button is taken as gpio17 below
const _: () = assert!(ble::trigger::BUTTON_PIN == 17, "button is wired to gpio17");

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Starting lazyble peripheral");

    let peripherals = Peripherals::take()?;

    // Button pulls the pin low while held
    let mut button = PinDriver::input(peripherals.pins.gpio17)?;
    button.set_pull(Pull::Up)?;
    info!("Button initialized on GPIO{}", button.pin());

    let config = PeripheralConfig {
        device_name: option_env!("LAZYBLE_DEVICE_NAME")
            .unwrap_or(ble::DEVICE_NAME)
            .to_string(),
        ..Default::default()
    };

    let host = Arc::new(NimbleHost::new(&config.device_name, config.security)?);
    let peripheral = Peripheral::new(host.clone(), config)?;
    host.bind_connection_events(Arc::new(peripheral.lifecycle_handler()));
    host.bind_attribute_events(peripheral.access_log());

    let held = button.is_low();
    if held {
        info!("Button held at boot");
    }
    peripheral.start(held)?;
    info!("Advertising started");

    loop {
        FreeRtos::delay_ms(ble::trigger::POLL_INTERVAL_MS);

        match peripheral.poll(&mut || button.is_low()) {
            Ok(TriggerOutcome::Activated { uuid, .. }) => info!("Service {} is live", uuid),
            Ok(_) => {}
            Err(e) if e.is_transient() => warn!("Poll failed, retrying next tick: {}", e),
            Err(e) => error!("Poll failed: {}", e),
        }
    }
}
