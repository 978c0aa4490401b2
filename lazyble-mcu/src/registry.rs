//! Advertised service UUID registry

use std::collections::HashSet;

use crate::BleUuid;

/// Deduplicating set of advertised UUIDs
///
/// Membership is hashed; insertion order is kept separately because it
/// decides the order of UUIDs in the advertisement payload. There is no
/// removal: advertised services are never retracted.
#[derive(Debug, Default, Clone)]
pub struct UuidRegistry {
    members: HashSet<BleUuid>,
    order: Vec<BleUuid>,
}

impl UuidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `uuid`; false (and no change) if it is already a member
    pub fn try_add(&mut self, uuid: BleUuid) -> bool {
        if !self.members.insert(uuid) {
            return false;
        }
        self.order.push(uuid);
        true
    }

    pub fn contains(&self, uuid: &BleUuid) -> bool {
        self.members.contains(uuid)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// UUIDs in insertion order
    pub fn uuids(&self) -> &[BleUuid] {
        &self.order
    }
}
