//! GATT service directory
//!
//! Holds the static services, created and started at init, and the single
//! dynamic service, created at most once at runtime.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use log::*;

use crate::ble::HostStack;
use crate::error::HostOp;
use crate::gatt::{Service, ServiceDef};
use crate::{BleUuid, PeripheralError, Result};

const DORMANT: u8 = 0;
const ACTIVATING: u8 = 1;
const ACTIVE: u8 = 2;
const FAULTED: u8 = 3;

/// Lifecycle of the dynamic service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    /// Not created yet
    Dormant,
    /// Claimed by a caller, creation in progress
    Activating,
    /// Created and started
    Active,
    /// The host stack failed during activation; never retried
    Faulted,
}

impl ActivationState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            DORMANT => ActivationState::Dormant,
            ACTIVATING => ActivationState::Activating,
            ACTIVE => ActivationState::Active,
            _ => ActivationState::Faulted,
        }
    }
}

pub struct ServiceDirectory<H: HostStack> {
    host: Arc<H>,
    statics: Vec<Service>,
    dynamic_def: ServiceDef,
    claim: AtomicU8,
    dynamic: OnceLock<Service>,
}

impl<H: HostStack> ServiceDirectory<H> {
    /// Create and start the static services
    ///
    /// Fails on a duplicate declaration before anything reaches the host stack.
    pub fn init(host: Arc<H>, statics: Vec<ServiceDef>, dynamic: ServiceDef) -> Result<Self> {
        let mut seen = HashSet::new();
        for def in statics.iter().chain(std::iter::once(&dynamic)) {
            if !seen.insert(def.uuid) {
                return Err(PeripheralError::DuplicateService(def.uuid));
            }
            def.validate()?;
        }

        let mut started = Vec::with_capacity(statics.len());
        for def in statics {
            create_and_start(host.as_ref(), &def)?;
            info!("service {} started", def.uuid);
            started.push(Service::started(def));
        }

        Ok(Self {
            host,
            statics: started,
            dynamic_def: dynamic,
            claim: AtomicU8::new(DORMANT),
            dynamic: OnceLock::new(),
        })
    }

    pub fn static_services(&self) -> &[Service] {
        &self.statics
    }

    pub fn dynamic_uuid(&self) -> BleUuid {
        self.dynamic_def.uuid
    }

    /// True once any caller has claimed the activation
    pub fn has_dynamic_service(&self) -> bool {
        self.activation_state() != ActivationState::Dormant
    }

    pub fn activation_state(&self) -> ActivationState {
        ActivationState::from_raw(self.claim.load(Ordering::Acquire))
    }

    /// The dynamic service, once it is fully started
    pub fn dynamic_service(&self) -> Option<&Service> {
        self.dynamic.get()
    }

    /// Create, populate and start the dynamic service
    ///
    /// Exactly one caller wins the claim; every other call, concurrent or
    /// later, fails with [`PeripheralError::AlreadyActive`] and touches nothing.
    pub fn activate_dynamic_service(&self) -> Result<&Service> {
        if self
            .claim
            .compare_exchange(DORMANT, ACTIVATING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PeripheralError::AlreadyActive(self.dynamic_def.uuid));
        }

        if let Err(e) = create_and_start(self.host.as_ref(), &self.dynamic_def) {
            // the stack may hold a half-built service; never create it again
            self.claim.store(FAULTED, Ordering::Release);
            error!("activation of {} failed: {}", self.dynamic_def.uuid, e);
            return Err(e);
        }

        let service = self
            .dynamic
            .get_or_init(|| Service::started(self.dynamic_def.clone()));
        self.claim.store(ACTIVE, Ordering::Release);
        info!("dynamic service {} started", service.uuid());
        Ok(service)
    }
}

fn create_and_start<H: HostStack>(host: &H, def: &ServiceDef) -> Result<()> {
    host.create_service(def)
        .map_err(|e| PeripheralError::host(HostOp::CreateService, e))?;
    host.start_service(def.uuid)
        .map_err(|e| PeripheralError::host(HostOp::StartService, e))?;
    Ok(())
}
