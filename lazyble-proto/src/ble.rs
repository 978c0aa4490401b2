//! GATT surface of the lazyble peripheral
//!
//! Shared by the firmware (which declares these services) and host tools
//! (which look for them). All service and attribute UUIDs are 16-bit
//! values on the Bluetooth base UUID.

/// Advertised device name
pub const DEVICE_NAME: &str = "NimBLE-Lazy";

/// Service-1: always active, holds an encrypted characteristic
pub const SERVICE_1_UUID: u16 = 0xDEAD;

/// Service-2: always active, holds a notifiable characteristic
pub const SERVICE_2_UUID: u16 = 0xBAAD;

/// Service-3: dormant until the trigger button is pressed
pub const SERVICE_3_UUID: u16 = 0xFEED;

/// Service-1 characteristic (read/write, encryption required)
pub const SERVICE_1_CHAR_UUID: u16 = 0xBEEF;

/// Service-2 characteristic (read/write/notify)
pub const SERVICE_2_CHAR_UUID: u16 = 0xF00D;

/// Service-3 characteristic (read/write/notify)
pub const SERVICE_3_CHAR_UUID: u16 = 0xBEEF;

/// Characteristic Presentation Format descriptor on the Service-1 characteristic
pub const PRESENTATION_FORMAT_UUID: u16 = 0x2904;

/// Writable descriptor on the Service-2 characteristic (write requires encryption)
pub const SERVICE_2_DESC_UUID: u16 = 0xC01D;

/// Maximum length of the Service-2 descriptor value
pub const SERVICE_2_DESC_MAX_LEN: u16 = 20;

/// Initial attribute values
pub mod values {
    pub const SERVICE_1_CHAR: &[u8] = b"Burger";
    pub const SERVICE_2_CHAR: &[u8] = b"Fries";
    pub const SERVICE_2_DESC: &[u8] = b"Send it back!";
    pub const SERVICE_3_CHAR: &[u8] = b"YUM";
}

/// Presentation format codes (Bluetooth assigned numbers, GATT Format Types)
pub mod format {
    pub const UTF8: u8 = 0x19;
}

/// Security defaults applied by the host stack at init
pub mod security {
    /// Store keys after pairing
    pub const BONDING: bool = false;
    /// Require man-in-the-middle protection
    pub const MITM: bool = false;
    /// Use LE Secure Connections pairing
    pub const SECURE_CONNECTIONS: bool = true;
}

/// Trigger input wiring
pub mod trigger {
    /// GPIO of the activation button (pull-up, active low)
    pub const BUTTON_PIN: u8 = 17;

    /// Poll interval of the main loop in milliseconds
    pub const POLL_INTERVAL_MS: u32 = 500;
}

/// Expand a 16-bit UUID to its 128-bit form on the Bluetooth base UUID
pub const fn uuid16_to_u128(uuid: u16) -> u128 {
    ((uuid as u128) << 96) | BLUETOOTH_BASE_UUID
}

/// The Bluetooth Base UUID: 00000000-0000-1000-8000-00805f9b34fb
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// All services of the declared surface, in declaration order
pub const ALL_SERVICES: [u16; 3] = [SERVICE_1_UUID, SERVICE_2_UUID, SERVICE_3_UUID];

/// Human readable name of a declared service
pub fn service_name(uuid: u16) -> Option<&'static str> {
    match uuid {
        SERVICE_1_UUID => Some("Service-1"),
        SERVICE_2_UUID => Some("Service-2"),
        SERVICE_3_UUID => Some("Service-3"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn uuid16_expansion() {
        assert_eq!(
            super::uuid16_to_u128(0xFEED),
            0x0000feed_0000_1000_8000_00805f9b34fb
        );
    }

    #[test]
    fn service_names() {
        assert_eq!(super::service_name(0xDEAD), Some("Service-1"));
        assert_eq!(super::service_name(0xFEED), Some("Service-3"));
        assert_eq!(super::service_name(0x180F), None);
    }

    #[test]
    fn descriptor_value_fits() {
        assert!(super::values::SERVICE_2_DESC.len() <= super::SERVICE_2_DESC_MAX_LEN as usize);
    }
}
