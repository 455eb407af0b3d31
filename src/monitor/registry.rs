//! Registry of live monitors, one per monitor key.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, info};

use super::{EndpointMonitor, MonitorKey};
use crate::collector;
use crate::config::{Credentials, MonitorConfig, Target};
use crate::driver::{Connector, RoutingMode};
use crate::error::MonitorError;
use crate::model::DbmsMode;

struct Entry {
    monitor: Arc<EndpointMonitor>,
    holders: usize,
}

#[derive(Default)]
struct Entries {
    monitors: HashMap<MonitorKey, Entry>,
    /// Routing decision per target, valid while its monitor is live.
    resolved: HashMap<Target, RoutingMode>,
}

impl Entries {
    /// Removes `key`'s monitor along with the routing decisions pointing at it.
    fn remove(&mut self, key: &MonitorKey) -> Option<Entry> {
        let entry = self.monitors.remove(key)?;
        self.resolved
            .retain(|target, mode| !(target.address == key.address && *mode == key.mode));
        Some(entry)
    }
}

pub(crate) struct Inner {
    connector: Arc<dyn Connector>,
    config: MonitorConfig,
    entries: Mutex<Entries>,
    started: AtomicUsize,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the registry entry of a monitor that exited on its own.
    pub(super) fn forget(&self, monitor: &EndpointMonitor) {
        let removed = {
            let mut entries = self.lock();
            let owned = entries
                .monitors
                .get(monitor.key())
                .is_some_and(|e| std::ptr::eq(Arc::as_ptr(&e.monitor), monitor));
            if owned {
                entries.remove(monitor.key())
            } else {
                None
            }
        };
        if removed.is_some() {
            debug!(key = %monitor.key(), "monitor removed from registry");
        }
    }

    /// Drops one holder; tears the monitor down when none are left.
    fn release(&self, monitor: &Arc<EndpointMonitor>) -> bool {
        let removed = {
            let mut entries = self.lock();
            let last = match entries.monitors.get_mut(monitor.key()) {
                Some(entry) if Arc::ptr_eq(&entry.monitor, monitor) => {
                    entry.holders = entry.holders.saturating_sub(1);
                    entry.holders == 0
                }
                _ => false,
            };
            if last {
                entries.remove(monitor.key())
            } else {
                None
            }
        };
        match removed {
            Some(entry) => {
                entry.monitor.stop();
                true
            }
            None => false,
        }
    }
}

/// Owns every live monitor and hands out one shared instance per key.
///
/// Created by the composition root and passed by reference; dropping it
/// stops every monitor.
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    pub fn new(connector: Arc<dyn Connector>, config: MonitorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                entries: Mutex::new(Entries::default()),
                started: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// URI scheme of the connector, used to pick member addresses.
    pub fn scheme(&self) -> &str {
        self.inner.connector.scheme()
    }

    /// Returns the monitor for `target`, starting it on first use.
    ///
    /// A routing-preferring target costs one probe of the endpoint's mode
    /// unless its monitor is already live.
    pub fn acquire(
        &self,
        target: &Target,
        credentials: &Credentials,
    ) -> Result<MonitorHandle, MonitorError> {
        let mode = self.resolve(target, credentials)?;
        let key = MonitorKey::new(target.address.clone(), mode);

        let mut entries = self.inner.lock();
        if target.prefer_routing {
            entries.resolved.insert(target.clone(), mode);
        }
        if let Some(entry) = entries.monitors.get_mut(&key) {
            entry.holders += 1;
            return Ok(self.handle(Arc::clone(&entry.monitor)));
        }

        let monitor = EndpointMonitor::spawn(
            key.clone(),
            Arc::clone(&self.inner.connector),
            credentials.clone(),
            self.inner.config.clone(),
            Arc::downgrade(&self.inner),
        )?;
        self.inner.started.fetch_add(1, Ordering::Relaxed);
        entries.monitors.insert(
            key,
            Entry {
                monitor: Arc::clone(&monitor),
                holders: 1,
            },
        );
        Ok(self.handle(monitor))
    }

    fn handle(&self, monitor: Arc<EndpointMonitor>) -> MonitorHandle {
        MonitorHandle {
            monitor,
            registry: Arc::downgrade(&self.inner),
            released: false,
        }
    }

    fn resolve(&self, target: &Target, credentials: &Credentials) -> Result<RoutingMode, MonitorError> {
        if !target.prefer_routing {
            return Ok(RoutingMode::Direct);
        }
        {
            let entries = self.inner.lock();
            if let Some(&mode) = entries.resolved.get(target) {
                let key = MonitorKey::new(target.address.clone(), mode);
                if entries.monitors.contains_key(&key) {
                    return Ok(mode);
                }
            }
        }

        // Probe outside the lock.
        let mut connection =
            self.inner
                .connector
                .connect(&target.address, RoutingMode::Direct, credentials)?;
        let dbms_mode = collector::probe_mode(connection.as_mut());
        connection.close();
        let mode = match dbms_mode? {
            DbmsMode::Core => RoutingMode::Routing,
            _ => RoutingMode::Direct,
        };
        debug!(address = %target.address, mode = %mode, "routing probe");
        Ok(mode)
    }

    /// Releases one holder of `handle`'s monitor. Returns true when this was
    /// the last holder and the monitor was stopped.
    pub fn release(&self, handle: MonitorHandle) -> bool {
        handle.release()
    }

    /// Stops monitors that have had no subscribers for at least `max_idle`.
    ///
    /// Handles to swept monitors stay valid but their monitor is stopped.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let swept: Vec<Entry> = {
            let mut entries = self.inner.lock();
            let idle: Vec<MonitorKey> = entries
                .monitors
                .iter()
                .filter(|(_, e)| {
                    e.monitor.subscriber_count() == 0
                        && e.monitor.idle_for().is_some_and(|d| d >= max_idle)
                })
                .map(|(k, _)| k.clone())
                .collect();
            idle.iter()
                .filter_map(|k| entries.remove(k))
                .collect()
        };
        for entry in &swept {
            entry.monitor.stop();
        }
        if !swept.is_empty() {
            info!(count = swept.len(), "idle monitors swept");
        }
        swept.len()
    }

    /// Stops every monitor.
    pub fn shutdown(&self) {
        let all: Vec<Entry> = {
            let mut entries = self.inner.lock();
            entries.resolved.clear();
            entries.monitors.drain().map(|(_, e)| e).collect()
        };
        for entry in &all {
            entry.monitor.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &MonitorKey) -> bool {
        self.inner.lock().monitors.contains_key(key)
    }

    /// Number of monitors constructed over the registry's lifetime.
    pub fn monitors_started(&self) -> usize {
        self.inner.started.load(Ordering::Relaxed)
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("monitors", &self.len())
            .finish_non_exhaustive()
    }
}

/// One holder's claim on a registry monitor.
///
/// Dropping the handle releases it like `Registry::release`.
pub struct MonitorHandle {
    monitor: Arc<EndpointMonitor>,
    registry: Weak<Inner>,
    released: bool,
}

impl MonitorHandle {
    pub fn monitor(&self) -> &Arc<EndpointMonitor> {
        &self.monitor
    }

    fn release(mut self) -> bool {
        self.released = true;
        match self.registry.upgrade() {
            Some(registry) => registry.release(&self.monitor),
            None => false,
        }
    }
}

impl Deref for MonitorHandle {
    type Target = EndpointMonitor;

    fn deref(&self) -> &EndpointMonitor {
        &self.monitor
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if !self.released {
            if let Some(registry) = self.registry.upgrade() {
                registry.release(&self.monitor);
            }
        }
    }
}

impl fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("key", self.monitor.key())
            .finish()
    }
}
