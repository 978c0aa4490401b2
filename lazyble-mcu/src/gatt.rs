//! GATT declarations
//!
//! Services are declared as plain data and handed to the host stack, which
//! owns the attribute table. A declaration never changes after creation.

use std::collections::HashSet;

use lazyble_proto::ble;

use crate::{BleUuid, PeripheralError, Result};

bitflags::bitflags! {
    /// Characteristic and descriptor access flags
    ///
    /// `READ_ENC` and `WRITE_ENC` require an encrypted link; the host stack
    /// enforces them, this crate only declares them. Flag names match
    /// NimBLE's property names.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Properties: u16 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const NOTIFY = 1 << 2;
        const INDICATE = 1 << 3;
        const READ_ENC = 1 << 4;
        const WRITE_ENC = 1 << 5;
    }
}

impl Properties {
    pub fn requires_encryption(&self) -> bool {
        self.intersects(Properties::READ_ENC | Properties::WRITE_ENC)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorDef {
    pub uuid: BleUuid,
    pub access: Properties,
    pub max_len: u16,
    pub value: Vec<u8>,
}

impl DescriptorDef {
    pub fn new(uuid: impl Into<BleUuid>, access: Properties, max_len: u16, value: &[u8]) -> Self {
        Self {
            uuid: uuid.into(),
            access,
            max_len,
            value: value.to_vec(),
        }
    }

    /// Characteristic Presentation Format (0x2904), read-only
    ///
    /// Value layout: format, exponent, unit (LE u16), namespace, description (LE u16).
    pub fn presentation_format(format: u8) -> Self {
        Self::new(
            ble::PRESENTATION_FORMAT_UUID,
            Properties::READ,
            7,
            &[format, 0, 0, 0, 1, 0, 0],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDef {
    pub uuid: BleUuid,
    pub properties: Properties,
    pub value: Vec<u8>,
    pub descriptors: Vec<DescriptorDef>,
}

impl CharacteristicDef {
    pub fn new(uuid: impl Into<BleUuid>, properties: Properties, value: &[u8]) -> Self {
        Self {
            uuid: uuid.into(),
            properties,
            value: value.to_vec(),
            descriptors: Vec::new(),
        }
    }

    pub fn with_descriptor(mut self, descriptor: DescriptorDef) -> Self {
        self.descriptors.push(descriptor);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDef {
    pub uuid: BleUuid,
    pub characteristics: Vec<CharacteristicDef>,
}

impl ServiceDef {
    pub fn new(uuid: impl Into<BleUuid>) -> Self {
        Self {
            uuid: uuid.into(),
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: CharacteristicDef) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn characteristic(&self, uuid: BleUuid) -> Option<&CharacteristicDef> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }

    /// Reject a service that declares the same characteristic twice
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for c in &self.characteristics {
            if !seen.insert(c.uuid) {
                return Err(PeripheralError::DuplicateCharacteristic {
                    service: self.uuid,
                    characteristic: c.uuid,
                });
            }
        }
        Ok(())
    }
}

/// A service created and started on the host stack
#[derive(Debug)]
pub struct Service {
    def: ServiceDef,
}

impl Service {
    pub(crate) fn started(def: ServiceDef) -> Self {
        Self { def }
    }

    pub fn uuid(&self) -> BleUuid {
        self.def.uuid
    }

    pub fn def(&self) -> &ServiceDef {
        &self.def
    }
}

/// Service-1: encrypted read/write characteristic with a UTF-8 format tag
pub fn service_1() -> ServiceDef {
    ServiceDef::new(ble::SERVICE_1_UUID).with_characteristic(
        CharacteristicDef::new(
            ble::SERVICE_1_CHAR_UUID,
            Properties::READ | Properties::WRITE | Properties::READ_ENC | Properties::WRITE_ENC,
            ble::values::SERVICE_1_CHAR,
        )
        .with_descriptor(DescriptorDef::presentation_format(ble::format::UTF8)),
    )
}

/// Service-2: notifiable characteristic with an encrypted-write descriptor
pub fn service_2() -> ServiceDef {
    ServiceDef::new(ble::SERVICE_2_UUID).with_characteristic(
        CharacteristicDef::new(
            ble::SERVICE_2_CHAR_UUID,
            Properties::READ | Properties::WRITE | Properties::NOTIFY,
            ble::values::SERVICE_2_CHAR,
        )
        .with_descriptor(DescriptorDef::new(
            ble::SERVICE_2_DESC_UUID,
            Properties::READ | Properties::WRITE | Properties::WRITE_ENC,
            ble::SERVICE_2_DESC_MAX_LEN,
            ble::values::SERVICE_2_DESC,
        )),
    )
}

/// Service-3: the lazily activated service
pub fn service_3() -> ServiceDef {
    ServiceDef::new(ble::SERVICE_3_UUID).with_characteristic(CharacteristicDef::new(
        ble::SERVICE_3_CHAR_UUID,
        Properties::READ | Properties::WRITE | Properties::NOTIFY,
        ble::values::SERVICE_3_CHAR,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_surface() {
        let s1 = service_1();
        let beef = s1.characteristic(BleUuid::from_u16(0xBEEF)).unwrap();
        assert!(beef.properties.contains(Properties::WRITE_ENC));
        assert!(beef.properties.requires_encryption());
        assert_eq!(beef.descriptors[0].value[0], ble::format::UTF8);

        let s2 = service_2();
        let food = s2.characteristic(BleUuid::from_u16(0xF00D)).unwrap();
        assert!(food.properties.contains(Properties::NOTIFY));
        assert!(!food.properties.requires_encryption());
        assert!(food.descriptors[0].access.contains(Properties::WRITE_ENC));
        assert_eq!(food.descriptors[0].max_len, 20);

        let s3 = service_3();
        assert_eq!(s3.uuid, BleUuid::from_u16(0xFEED));
        assert_eq!(s3.characteristics[0].value, b"YUM");
    }

    #[test]
    fn duplicate_characteristic_rejected() {
        let def = service_3().with_characteristic(CharacteristicDef::new(
            0xBEEF_u16,
            Properties::READ,
            b"again",
        ));
        assert!(matches!(
            def.validate(),
            Err(PeripheralError::DuplicateCharacteristic { .. })
        ));
        assert!(service_1().validate().is_ok());
    }

    #[test]
    fn flag_names_follow_nimble() {
        let props = Properties::READ | Properties::WRITE_ENC;
        let names: Vec<&str> = props.iter_names().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["READ", "WRITE_ENC"]);
        assert_eq!(Properties::from_name("NOTIFY"), Some(Properties::NOTIFY));
        assert!(Properties::default().is_empty());
    }
}
