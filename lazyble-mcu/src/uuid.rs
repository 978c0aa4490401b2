//! Bluetooth UUIDs
//!
//! A [`BleUuid`] is either a 16-bit SIG-style alias or a full 128-bit UUID.
//! Equality and hashing go through the 128-bit form, so `0xFEED` and
//! `0000feed-0000-1000-8000-00805f9b34fb` are the same service.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use lazyble_proto::ble::{uuid16_to_u128, BLUETOOTH_BASE_UUID};

#[derive(Debug, Clone, Copy)]
pub enum BleUuid {
    Uuid16(u16),
    Uuid128(uuid::Uuid),
}

impl BleUuid {
    pub const fn from_u16(uuid: u16) -> Self {
        BleUuid::Uuid16(uuid)
    }

    pub const fn from_u128(uuid: u128) -> Self {
        BleUuid::Uuid128(uuid::Uuid::from_u128(uuid))
    }

    pub fn as_u128(&self) -> u128 {
        match self {
            BleUuid::Uuid16(u) => uuid16_to_u128(*u),
            BleUuid::Uuid128(u) => u.as_u128(),
        }
    }

    pub fn to_uuid(&self) -> uuid::Uuid {
        uuid::Uuid::from_u128(self.as_u128())
    }

    /// The 16-bit alias, if this UUID sits on the Bluetooth base UUID
    pub fn as_u16(&self) -> Option<u16> {
        let u = self.as_u128();
        if u & ((1 << 96) - 1) == BLUETOOTH_BASE_UUID && (u >> 112) == 0 {
            Some((u >> 96) as u16)
        } else {
            None
        }
    }
}

impl PartialEq for BleUuid {
    fn eq(&self, other: &Self) -> bool {
        self.as_u128() == other.as_u128()
    }
}

impl Eq for BleUuid {}

impl Hash for BleUuid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_u128().hash(state);
    }
}

impl From<u16> for BleUuid {
    fn from(uuid: u16) -> Self {
        BleUuid::Uuid16(uuid)
    }
}

impl From<uuid::Uuid> for BleUuid {
    fn from(uuid: uuid::Uuid) -> Self {
        BleUuid::Uuid128(uuid)
    }
}

impl fmt::Display for BleUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u16() {
            Some(u) => write!(f, "0x{u:04x}"),
            None => write!(f, "{}", self.to_uuid().hyphenated()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid BLE UUID: {0:?}")]
pub struct ParseUuidError(String);

impl FromStr for BleUuid {
    type Err = ParseUuidError;

    /// Accepts `"FEED"`, `"0xfeed"` or a full hyphenated UUID
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if short.len() == 4 {
            return u16::from_str_radix(short, 16)
                .map(BleUuid::Uuid16)
                .map_err(|_| ParseUuidError(s.to_string()));
        }
        uuid::Uuid::parse_str(s)
            .map(BleUuid::Uuid128)
            .map_err(|_| ParseUuidError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::BleUuid;

    #[test]
    fn short_and_long_forms_are_equal() {
        let long: BleUuid = "0000feed-0000-1000-8000-00805f9b34fb".parse().unwrap();
        assert_eq!(long, BleUuid::from_u16(0xFEED));
        assert_eq!(long.as_u16(), Some(0xFEED));

        let mut set = std::collections::HashSet::new();
        assert!(set.insert(long));
        assert!(!set.insert(BleUuid::from_u16(0xFEED)));
    }

    #[test]
    fn parse_and_display() {
        let u: BleUuid = "DEAD".parse().unwrap();
        assert_eq!(u.to_string(), "0xdead");
        assert_eq!("0xbaad".parse::<BleUuid>().unwrap(), BleUuid::from_u16(0xBAAD));

        let custom: BleUuid = "b40e1000-5e7c-1c3e-0000-000000000000".parse().unwrap();
        assert_eq!(custom.as_u16(), None);
        assert_eq!(custom.to_string(), "b40e1000-5e7c-1c3e-0000-000000000000");

        assert!("F0".parse::<BleUuid>().is_err());
        assert!("zzzz".parse::<BleUuid>().is_err());
    }
}
