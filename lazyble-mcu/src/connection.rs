//! Connection lifecycle
//!
//! The host stack advertises with automatic re-advertising disabled, so the
//! disconnect handler here is the single path that makes the peripheral
//! discoverable again after a client leaves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::*;

use crate::advertising::{Advertiser, StartOutcome};
use crate::ble::HostStack;

/// A live link as reported by the host stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Host-assigned connection handle
    pub handle: u16,
    /// Peer over-the-air address
    pub peer: String,
    pub encrypted: bool,
}

/// Connection events delivered by the host stack
///
/// Implementations must tolerate being called from the stack's task at
/// any point between poll iterations.
pub trait ConnectionEvents: Send + Sync {
    fn on_connect(&self, conn: &ConnectionInfo);
    fn on_disconnect(&self, conn: &ConnectionInfo);
}

/// Live connections, keyed by handle
#[derive(Debug, Default)]
pub struct ConnectionTable {
    live: Mutex<HashMap<u16, ConnectionInfo>>,
}

impl ConnectionTable {
    fn live(&self) -> MutexGuard<'_, HashMap<u16, ConnectionInfo>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, conn: ConnectionInfo) {
        self.live().insert(conn.handle, conn);
    }

    pub fn remove(&self, handle: u16) -> Option<ConnectionInfo> {
        self.live().remove(&handle)
    }

    pub fn get(&self, handle: u16) -> Option<ConnectionInfo> {
        self.live().get(&handle).cloned()
    }

    pub fn len(&self) -> usize {
        self.live().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live().is_empty()
    }
}

/// Records connections and re-arms advertising on every disconnect
pub struct LifecycleHandler<H: HostStack> {
    advertiser: Weak<Advertiser<H>>,
    connections: Arc<ConnectionTable>,
}

impl<H: HostStack> LifecycleHandler<H> {
    pub fn new(advertiser: Weak<Advertiser<H>>, connections: Arc<ConnectionTable>) -> Self {
        Self {
            advertiser,
            connections,
        }
    }

    fn rearm(&self) {
        let Some(advertiser) = self.advertiser.upgrade() else {
            warn!("disconnect before advertising was configured, not re-arming");
            return;
        };

        match advertiser.start() {
            Ok(StartOutcome::Started) => info!("advertising re-armed"),
            Ok(StartOutcome::AlreadyRunning) => debug!("advertising already running"),
            Err(e) => error!("failed to re-arm advertising: {}", e),
        }
    }
}

impl<H: HostStack> ConnectionEvents for LifecycleHandler<H> {
    fn on_connect(&self, conn: &ConnectionInfo) {
        info!(
            "client connected: handle={} addr={} encrypted={}",
            conn.handle, conn.peer, conn.encrypted
        );
        self.connections.insert(conn.clone());
    }

    fn on_disconnect(&self, conn: &ConnectionInfo) {
        if self.connections.remove(conn.handle).is_none() {
            debug!("disconnect for unknown handle {}", conn.handle);
        }
        info!("client disconnected: addr={} - start advertising", conn.peer);
        self.rearm();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{ConnectionEvents, ConnectionInfo, ConnectionTable, LifecycleHandler};
    use crate::advertising::Advertiser;
    use crate::testing::FakeHost;

    fn conn(handle: u16) -> ConnectionInfo {
        ConnectionInfo {
            handle,
            peer: "aa:bb:cc:dd:ee:ff".to_string(),
            encrypted: false,
        }
    }

    #[test]
    fn disconnect_rearms_advertising() {
        let host = Arc::new(FakeHost::default());
        let adv = Arc::new(Advertiser::new(host.clone(), "test", true));
        let table = Arc::new(ConnectionTable::default());
        let handler = LifecycleHandler::new(Arc::downgrade(&adv), table.clone());

        adv.start().unwrap();
        host.client_connects();
        handler.on_connect(&conn(1));
        assert!(!adv.is_advertising());
        assert_eq!(table.get(1).map(|c| c.handle), Some(1));

        handler.on_disconnect(&conn(1));
        assert!(adv.is_advertising());
        assert!(table.is_empty());

        // a replayed disconnect is harmless
        handler.on_disconnect(&conn(1));
        assert_eq!(host.start_calls(), 2);
    }

    #[test]
    fn connect_does_not_touch_advertising() {
        let host = Arc::new(FakeHost::default());
        let adv = Arc::new(Advertiser::new(host.clone(), "test", true));
        let handler = LifecycleHandler::new(Arc::downgrade(&adv), Arc::default());

        adv.start().unwrap();
        handler.on_connect(&conn(7));
        assert!(adv.is_advertising());
        assert_eq!(host.start_calls(), 1);
    }

    #[test]
    fn rejected_restart_does_not_panic() {
        let host = Arc::new(FakeHost::default());
        let adv = Arc::new(Advertiser::new(host.clone(), "test", true));
        let handler = LifecycleHandler::new(Arc::downgrade(&adv), Arc::default());

        host.reject_starts(true);
        handler.on_disconnect(&conn(2));
        assert!(!adv.is_advertising());
    }

    #[test]
    fn dropped_advertiser_is_a_noop() {
        let host = Arc::new(FakeHost::default());
        let adv = Arc::new(Advertiser::new(host.clone(), "test", true));
        let handler = LifecycleHandler::new(Arc::downgrade(&adv), Arc::default());
        drop(adv);

        handler.on_disconnect(&conn(3));
        assert_eq!(host.start_calls(), 0);
    }
}
