//! Activation trigger
//!
//! Runs once at boot if the button is held, and on every poll while the
//! dynamic service is absent. After the first activation every call is a
//! cheap no-op, so the poll loop may keep calling forever.

use std::sync::Weak;

use log::*;

use crate::advertising::{Advertiser, StartOutcome};
use crate::ble::{HostStack, TriggerInput};
use crate::directory::ServiceDirectory;
use crate::{BleUuid, PeripheralError, Result};

/// What a trigger invocation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// This call created the dynamic service and advertised it
    Activated {
        uuid: BleUuid,
        /// False if the UUID was already in the payload
        uuid_added: bool,
        advertising: StartOutcome,
    },
    /// The dynamic service already exists (or another caller is creating it)
    AlreadyActive,
    /// The directory or advertiser is gone
    NoDirectory,
    /// The button was not held
    NotPressed,
}

pub struct ActivationTrigger<H: HostStack> {
    directory: Weak<ServiceDirectory<H>>,
    advertiser: Weak<Advertiser<H>>,
}

impl<H: HostStack> Clone for ActivationTrigger<H> {
    fn clone(&self) -> Self {
        Self {
            directory: self.directory.clone(),
            advertiser: self.advertiser.clone(),
        }
    }
}

impl<H: HostStack> ActivationTrigger<H> {
    pub fn new(directory: Weak<ServiceDirectory<H>>, advertiser: Weak<Advertiser<H>>) -> Self {
        Self {
            directory,
            advertiser,
        }
    }

    /// Activate the dynamic service if it is absent
    ///
    /// On success advertising is running regardless of its state at call time.
    pub fn fire(&self) -> Result<TriggerOutcome> {
        let (Some(directory), Some(advertiser)) =
            (self.directory.upgrade(), self.advertiser.upgrade())
        else {
            return Ok(TriggerOutcome::NoDirectory);
        };

        if directory.has_dynamic_service() {
            return Ok(TriggerOutcome::AlreadyActive);
        }

        info!("=================");
        info!("button pressed, starting additional service");

        let uuid = match directory.activate_dynamic_service() {
            Ok(service) => service.uuid(),
            // lost the claim to a concurrent caller between the check and here
            Err(PeripheralError::AlreadyActive(_)) => return Ok(TriggerOutcome::AlreadyActive),
            Err(e) => return Err(e),
        };

        let uuid_added = advertiser.add_uuid(uuid)?;
        let advertising = advertiser.start()?;

        info!("service started and advertising restarted");
        info!("=================");
        Ok(TriggerOutcome::Activated {
            uuid,
            uuid_added,
            advertising,
        })
    }

    /// Sample the button and fire while it is held
    pub fn poll(&self, input: &mut impl TriggerInput) -> Result<TriggerOutcome> {
        match self.directory.upgrade() {
            None => return Ok(TriggerOutcome::NoDirectory),
            Some(d) if d.has_dynamic_service() => return Ok(TriggerOutcome::AlreadyActive),
            Some(_) => {}
        }
        if !input.is_pressed() {
            return Ok(TriggerOutcome::NotPressed);
        }
        self.fire()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ActivationTrigger, TriggerOutcome};
    use crate::advertising::{Advertiser, StartOutcome};
    use crate::directory::ServiceDirectory;
    use crate::gatt::{service_1, service_2, service_3};
    use crate::testing::FakeHost;
    use crate::BleUuid;

    struct Rig {
        host: Arc<FakeHost>,
        dir: Arc<ServiceDirectory<FakeHost>>,
        adv: Arc<Advertiser<FakeHost>>,
        trigger: ActivationTrigger<FakeHost>,
    }

    fn rig() -> Rig {
        let host = Arc::new(FakeHost::default());
        let dir = Arc::new(
            ServiceDirectory::init(host.clone(), vec![service_1(), service_2()], service_3())
                .unwrap(),
        );
        let adv = Arc::new(Advertiser::new(host.clone(), "test", true));
        let trigger = ActivationTrigger::new(Arc::downgrade(&dir), Arc::downgrade(&adv));
        Rig {
            host,
            dir,
            adv,
            trigger,
        }
    }

    const FEED: BleUuid = BleUuid::from_u16(0xFEED);

    #[test]
    fn held_button_activates_exactly_once() {
        let r = rig();
        let mut held = || true;

        let first = r.trigger.poll(&mut held).unwrap();
        assert!(matches!(
            first,
            TriggerOutcome::Activated {
                uuid_added: true,
                advertising: StartOutcome::Started,
                ..
            }
        ));
        for _ in 0..10 {
            assert_eq!(r.trigger.poll(&mut held).unwrap(), TriggerOutcome::AlreadyActive);
        }

        assert_eq!(r.host.created_count(FEED), 1);
        assert_eq!(r.adv.uuids().iter().filter(|u| **u == FEED).count(), 1);
        assert!(r.adv.is_advertising());
    }

    #[test]
    fn released_button_does_nothing() {
        let r = rig();
        let mut released = || false;
        assert_eq!(r.trigger.poll(&mut released).unwrap(), TriggerOutcome::NotPressed);
        assert!(!r.dir.has_dynamic_service());
    }

    #[test]
    fn activation_while_advertising_keeps_it_running() {
        let r = rig();
        r.adv.add_uuid(BleUuid::from_u16(0xDEAD)).unwrap();
        r.adv.start().unwrap();

        let outcome = r.trigger.fire().unwrap();
        assert!(matches!(
            outcome,
            TriggerOutcome::Activated {
                advertising: StartOutcome::AlreadyRunning,
                ..
            }
        ));
        assert!(r.adv.is_advertising());
        assert_eq!(r.host.advertisement().unwrap().service_uuids.len(), 2);
    }

    #[test]
    fn missing_directory_is_a_noop() {
        let r = rig();
        let Rig { host, dir, adv, trigger } = r;
        drop(dir);

        assert_eq!(trigger.fire().unwrap(), TriggerOutcome::NoDirectory);
        assert_eq!(trigger.poll(&mut || true).unwrap(), TriggerOutcome::NoDirectory);
        assert_eq!(host.created_count(FEED), 0);
        drop(adv);
    }

    #[test]
    fn concurrent_triggers_activate_once() {
        let r = rig();
        let activated = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let t = r.trigger.clone();
                    s.spawn(move || t.fire())
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().ok())
                .filter(|res| matches!(res, Ok(TriggerOutcome::Activated { .. })))
                .count()
        });

        assert_eq!(activated, 1);
        assert_eq!(r.host.created_count(FEED), 1);
        assert_eq!(r.adv.uuids(), vec![FEED]);
    }

    #[test]
    fn rejected_start_is_reported_after_activation() {
        let r = rig();
        r.host.reject_starts(true);

        let err = r.trigger.fire().unwrap_err();
        assert!(err.is_transient());
        assert!(r.dir.dynamic_service().is_some());
        assert_eq!(r.adv.uuids(), vec![FEED]);
        assert!(!r.adv.is_advertising());

        r.host.reject_starts(false);
        assert_eq!(r.trigger.fire().unwrap(), TriggerOutcome::AlreadyActive);
        assert_eq!(r.adv.start().unwrap(), StartOutcome::Started);
        assert_eq!(r.host.created_count(FEED), 1);
    }

    #[test]
    fn rejected_payload_is_reported_after_activation() {
        let r = rig();
        r.host.reject_advertisement(true);

        assert!(r.trigger.fire().unwrap_err().is_transient());
        assert!(r.dir.dynamic_service().is_some());
        assert!(r.adv.uuids().is_empty());
        assert_eq!(r.trigger.poll(&mut || true).unwrap(), TriggerOutcome::AlreadyActive);
        assert_eq!(r.host.created_count(FEED), 1);
    }
}
