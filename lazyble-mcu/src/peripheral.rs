//! Application context
//!
//! One explicitly constructed [`Peripheral`] owns the advertiser, the
//! service directory and the connection table. Stack callbacks get handler
//! objects that hold weak references into it.

use std::sync::Arc;

use lazyble_proto::ble;
use log::*;

use crate::access::AccessLog;
use crate::advertising::{Advertiser, StartOutcome};
use crate::ble::{HostStack, TriggerInput};
use crate::connection::{ConnectionTable, LifecycleHandler};
use crate::directory::ServiceDirectory;
use crate::gatt::{self, ServiceDef};
use crate::trigger::{ActivationTrigger, TriggerOutcome};
use crate::Result;

/// Pairing policy handed to the host stack at init
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityConfig {
    pub bonding: bool,
    pub mitm: bool,
    pub secure_connections: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            bonding: ble::security::BONDING,
            mitm: ble::security::MITM,
            secure_connections: ble::security::SECURE_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeripheralConfig {
    pub device_name: String,
    pub scan_response: bool,
    /// Leave false: the disconnect handler re-arms advertising itself
    pub advertise_on_disconnect: bool,
    pub security: SecurityConfig,
    pub static_services: Vec<ServiceDef>,
    pub dynamic_service: ServiceDef,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            device_name: ble::DEVICE_NAME.to_string(),
            scan_response: true,
            advertise_on_disconnect: false,
            security: SecurityConfig::default(),
            static_services: vec![gatt::service_1(), gatt::service_2()],
            dynamic_service: gatt::service_3(),
        }
    }
}

pub struct Peripheral<H: HostStack> {
    config: PeripheralConfig,
    advertiser: Arc<Advertiser<H>>,
    directory: Arc<ServiceDirectory<H>>,
    connections: Arc<ConnectionTable>,
    access: Arc<AccessLog>,
}

impl<H: HostStack> Peripheral<H> {
    /// Configure the stack and create the static services
    ///
    /// Nothing is advertised yet; bind the handlers, then call [`Peripheral::start`].
    pub fn new(host: Arc<H>, config: PeripheralConfig) -> Result<Self> {
        host.set_advertise_on_disconnect(config.advertise_on_disconnect);

        // scan response is switched on in `start`, after the boot-time activation
        let advertiser = Arc::new(Advertiser::new(host.clone(), &config.device_name, false));
        let directory = Arc::new(ServiceDirectory::init(
            host,
            config.static_services.clone(),
            config.dynamic_service.clone(),
        )?);

        Ok(Self {
            config,
            advertiser,
            directory,
            connections: Arc::default(),
            access: Arc::default(),
        })
    }

    /// Advertise the static services and start the beacon
    ///
    /// With `trigger_held` the dynamic service is activated first, so its
    /// UUID leads the payload. A failed boot-time activation is logged and
    /// left to the poll loop.
    pub fn start(&self, trigger_held: bool) -> Result<StartOutcome> {
        if trigger_held {
            match self.trigger().fire() {
                Ok(outcome) => debug!("boot-time activation: {:?}", outcome),
                Err(e) => error!("boot-time activation failed: {}", e),
            }
        }

        self.reconcile()?;
        self.advertiser.start()
    }

    /// One poll-loop iteration
    ///
    /// Samples the trigger while the dynamic service is absent, puts every
    /// started service back in the payload if a host failure kept it out,
    /// and re-arms advertising if it stopped with no client connected.
    pub fn poll(&self, input: &mut impl TriggerInput) -> Result<TriggerOutcome> {
        let outcome = self.trigger().poll(input);

        self.reconcile()?;
        if self.connections.is_empty() && !self.advertiser.is_advertising() {
            warn!("advertising stopped with no client connected, re-arming");
            self.advertiser.start()?;
        }
        outcome
    }

    /// Advertise every started service and apply the scan response setting
    ///
    /// Each step is idempotent; once everything is registered this sends
    /// nothing to the host stack.
    fn reconcile(&self) -> Result<()> {
        let started = self
            .directory
            .static_services()
            .iter()
            .chain(self.directory.dynamic_service());
        for service in started {
            self.advertiser.add_uuid(service.uuid())?;
        }
        self.advertiser.set_scan_response(self.config.scan_response)?;
        Ok(())
    }

    pub fn trigger(&self) -> ActivationTrigger<H> {
        ActivationTrigger::new(Arc::downgrade(&self.directory), Arc::downgrade(&self.advertiser))
    }

    /// Handler for the stack's connect/disconnect callbacks
    pub fn lifecycle_handler(&self) -> LifecycleHandler<H> {
        LifecycleHandler::new(Arc::downgrade(&self.advertiser), self.connections.clone())
    }

    /// Handler for the stack's attribute callbacks
    pub fn access_log(&self) -> Arc<AccessLog> {
        self.access.clone()
    }

    pub fn config(&self) -> &PeripheralConfig {
        &self.config
    }

    pub fn advertiser(&self) -> &Advertiser<H> {
        &self.advertiser
    }

    pub fn directory(&self) -> &ServiceDirectory<H> {
        &self.directory
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }
}
