//! Endpoint monitors.
//!
//! An `EndpointMonitor` owns one background thread that samples one endpoint
//! every refresh period and publishes the result to its subscribers. Monitors
//! are normally obtained from a [`Registry`], which guarantees one monitor
//! per [`MonitorKey`].

mod registry;
mod worker;

pub use registry::{MonitorHandle, Registry};

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{Address, Credentials, MonitorConfig};
use crate::driver::{Connector, RoutingMode};
use crate::error::MonitorError;
use crate::model::{QueryId, QueryInfo, Snapshot, TransactionInfo};

/// Identity of one physical monitor: what it connects to and how.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorKey {
    pub address: Address,
    pub mode: RoutingMode,
}

impl MonitorKey {
    pub fn new(address: Address, mode: RoutingMode) -> Self {
        Self { address, mode }
    }

    pub fn direct(address: Address) -> Self {
        Self::new(address, RoutingMode::Direct)
    }
}

impl fmt::Display for MonitorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    /// No subscribers; no network work.
    Idle,
    Connecting,
    Sampling,
    /// The last cycle failed.
    Error,
    Stopped,
}

impl fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MonitorPhase::Idle => "idle",
            MonitorPhase::Connecting => "connecting",
            MonitorPhase::Sampling => "sampling",
            MonitorPhase::Error => "error",
            MonitorPhase::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Receives the outcome of every sampling cycle.
///
/// Called on the monitor's thread, outside every lock. `None` means the
/// endpoint is currently unavailable.
pub trait Subscriber: Send + Sync {
    fn on_refresh(&self, snapshot: Option<&Arc<Snapshot>>);

    /// Called before `on_refresh(None)` when a cycle fails.
    fn on_error(&self, _error: &MonitorError) {}
}

struct FnSubscriber<F>(F);

impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(Option<&Arc<Snapshot>>) + Send + Sync,
{
    fn on_refresh(&self, snapshot: Option<&Arc<Snapshot>>) {
        (self.0)(snapshot)
    }
}

/// Token returned by `attach`, used to detach again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subscription(u64);

/// A query to terminate on the monitored endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillRequest {
    pub query_id: QueryId,
}

impl KillRequest {
    pub fn query(query_id: QueryId) -> Self {
        Self { query_id }
    }

    /// Kills the query a transaction is currently running; `None` when the
    /// transaction is idle.
    pub fn for_transaction(tx: &TransactionInfo) -> Option<Self> {
        tx.current_query_id.map(Self::query)
    }
}

impl From<&QueryInfo> for KillRequest {
    fn from(query: &QueryInfo) -> Self {
        Self::query(query.id)
    }
}

struct State {
    subscribers: BTreeMap<Subscription, Arc<dyn Subscriber>>,
    next_subscription: u64,
    kills: VecDeque<KillRequest>,
    running: bool,
    /// Cut the current sleep short.
    wake: bool,
    phase: MonitorPhase,
    latest: Option<Arc<Snapshot>>,
    last_error: Option<MonitorError>,
    idle_since: Option<Instant>,
    cycles: u64,
}

/// State shared between a monitor and its worker thread.
struct Shared {
    key: MonitorKey,
    credentials: Credentials,
    config: MonitorConfig,
    state: Mutex<State>,
    signal: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self, state: &mut State) {
        state.wake = true;
        self.signal.notify_all();
    }

    /// Puts kills that could not be sent back at the head of the queue.
    fn requeue(&self, kills: Vec<KillRequest>) {
        if kills.is_empty() {
            return;
        }
        let mut state = self.lock();
        for kill in kills.into_iter().rev() {
            state.kills.push_front(kill);
        }
    }
}

/// Background sampler for one endpoint.
pub struct EndpointMonitor {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    registry: Weak<registry::Inner>,
}

impl EndpointMonitor {
    /// Starts a monitor outside any registry.
    pub fn start(
        key: MonitorKey,
        connector: Arc<dyn Connector>,
        credentials: Credentials,
        config: MonitorConfig,
    ) -> Result<Arc<Self>, MonitorError> {
        Self::spawn(key, connector, credentials, config, Weak::new())
    }

    fn spawn(
        key: MonitorKey,
        connector: Arc<dyn Connector>,
        credentials: Credentials,
        config: MonitorConfig,
        registry: Weak<registry::Inner>,
    ) -> Result<Arc<Self>, MonitorError> {
        let shared = Arc::new(Shared {
            key: key.clone(),
            credentials,
            config,
            state: Mutex::new(State {
                subscribers: BTreeMap::new(),
                next_subscription: 1,
                kills: VecDeque::new(),
                running: true,
                wake: false,
                phase: MonitorPhase::Idle,
                latest: None,
                last_error: None,
                idle_since: Some(Instant::now()),
                cycles: 0,
            }),
            signal: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("monitor {}", key))
            .spawn(move || worker::run(worker_shared, connector))
            .map_err(|e| MonitorError::Spawn(e.to_string()))?;
        info!(key = %key, "monitor started");

        Ok(Arc::new(Self {
            shared,
            worker_id: handle.thread().id(),
            thread: Mutex::new(Some(handle)),
            registry,
        }))
    }

    pub fn key(&self) -> &MonitorKey {
        &self.shared.key
    }

    pub fn address(&self) -> &Address {
        &self.shared.key.address
    }

    pub fn refresh_period(&self) -> Duration {
        self.shared.config.refresh_period
    }

    pub fn attach(&self, subscriber: Arc<dyn Subscriber>) -> Subscription {
        let mut state = self.shared.lock();
        let subscription = Subscription(state.next_subscription);
        state.next_subscription += 1;
        state.subscribers.insert(subscription, subscriber);
        state.idle_since = None;
        self.shared.wake(&mut state);
        subscription
    }

    /// Attaches a closure that only cares about snapshots.
    pub fn attach_fn<F>(&self, f: F) -> Subscription
    where
        F: Fn(Option<&Arc<Snapshot>>) + Send + Sync + 'static,
    {
        self.attach(Arc::new(FnSubscriber(f)))
    }

    /// Removes a subscriber. Returns false if it was not attached.
    pub fn detach(&self, subscription: Subscription) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            let removed = state.subscribers.remove(&subscription);
            if removed.is_some() && state.subscribers.is_empty() {
                state.idle_since = Some(Instant::now());
            }
            removed
        };
        // Dropped outside the lock: a subscriber may own this monitor.
        removed.is_some()
    }

    /// Queues a kill, applied at the start of the next cycle.
    pub fn kill(&self, request: KillRequest) {
        let mut state = self.shared.lock();
        state.kills.push_back(request);
        self.shared.wake(&mut state);
    }

    /// Starts the next cycle without waiting out the refresh period.
    pub fn refresh_now(&self) {
        let mut state = self.shared.lock();
        self.shared.wake(&mut state);
    }

    /// Snapshot of the last completed cycle; `None` before the first one
    /// and after a failed one.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.shared.lock().latest.clone()
    }

    pub fn last_error(&self) -> Option<MonitorError> {
        self.shared.lock().last_error.clone()
    }

    pub fn phase(&self) -> MonitorPhase {
        self.shared.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    pub fn pending_kills(&self) -> usize {
        self.shared.lock().kills.len()
    }

    /// Completed (published) cycles.
    pub fn cycles(&self) -> u64 {
        self.shared.lock().cycles
    }

    /// How long the monitor has had no subscribers.
    pub fn idle_for(&self) -> Option<Duration> {
        self.shared.lock().idle_since.map(|since| since.elapsed())
    }

    /// Stops the sampling loop and removes the monitor from its registry.
    ///
    /// Blocks until the thread has exited, so no callback runs after this
    /// returns. Called from a subscriber callback, the loop finishes the
    /// current cycle and stops without being joined.
    pub fn exit(&self) {
        if self.stop() {
            if let Some(registry) = self.registry.upgrade() {
                registry.forget(self);
            }
        }
    }

    /// Stops and joins the worker. Returns whether this call stopped it.
    fn stop(&self) -> bool {
        let stopped_now = {
            let mut state = self.shared.lock();
            let was_running = state.running;
            state.running = false;
            self.shared.wake(&mut state);
            was_running
        };
        if stopped_now {
            info!(key = %self.shared.key, "monitor stopping");
        }
        if thread::current().id() == self.worker_id {
            return stopped_now;
        }

        let mut slot = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            if handle.join().is_err() {
                warn!(key = %self.shared.key, "monitor thread panicked");
            }
            self.shared.lock().phase = MonitorPhase::Stopped;
        }
        stopped_now
    }
}

impl Drop for EndpointMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for EndpointMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointMonitor")
            .field("key", &self.shared.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::driver::mock::MockConnector;
    use std::sync::OnceLock;
    use std::sync::mpsc::{self, Receiver};

    pub(crate) const WAIT: Duration = Duration::from_secs(5);

    pub(crate) fn fast_config() -> MonitorConfig {
        MonitorConfig::default().with_refresh_period(Duration::from_millis(20))
    }

    fn start(connector: &MockConnector, address: &Address, config: MonitorConfig) -> Arc<EndpointMonitor> {
        EndpointMonitor::start(
            MonitorKey::direct(address.clone()),
            Arc::new(connector.clone()),
            Credentials::new("neo4j", "secret"),
            config,
        )
        .unwrap()
    }

    fn channel(monitor: &EndpointMonitor) -> (Subscription, Receiver<Option<Arc<Snapshot>>>) {
        let (tx, rx) = mpsc::channel();
        let sub = monitor.attach_fn(move |s| {
            let _ = tx.send(s.cloned());
        });
        (sub, rx)
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Error(MonitorError),
        Refresh(bool),
    }

    struct Recorder(Mutex<Vec<Event>>, mpsc::Sender<()>);

    impl Subscriber for Recorder {
        fn on_refresh(&self, snapshot: Option<&Arc<Snapshot>>) {
            self.0.lock().unwrap().push(Event::Refresh(snapshot.is_some()));
            let _ = self.1.send(());
        }

        fn on_error(&self, error: &MonitorError) {
            self.0.lock().unwrap().push(Event::Error(error.clone()));
        }
    }

    #[test]
    fn idle_monitor_makes_no_network_calls() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        let monitor = start(&connector, &address, fast_config());

        thread::sleep(Duration::from_millis(120));
        assert_eq!(connector.network_calls(&address), 0);
        assert_eq!(monitor.phase(), MonitorPhase::Idle);
        assert!(monitor.idle_for().is_some());

        let (_sub, rx) = channel(&monitor);
        let first = rx.recv_timeout(WAIT).unwrap();
        assert!(first.is_some());
        assert!(connector.network_calls(&address) > 0);
        assert_eq!(monitor.phase(), MonitorPhase::Sampling);
        assert_eq!(monitor.idle_for(), None);
        monitor.exit();
    }

    #[test]
    fn attach_detach_leaves_net_set() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        let config = MonitorConfig::default().with_refresh_period(Duration::from_secs(60));
        let monitor = start(&connector, &address, config);

        let a = monitor.attach_fn(|_| {});
        let b = monitor.attach_fn(|_| {});
        let c = monitor.attach_fn(|_| {});
        assert_ne!(a, b);
        assert!(monitor.detach(b));
        assert!(!monitor.detach(b));
        assert_eq!(monitor.subscriber_count(), 2);
        assert!(monitor.detach(a));
        assert!(monitor.detach(c));
        assert_eq!(monitor.subscriber_count(), 0);
        assert!(monitor.idle_for().is_some());
        monitor.exit();
    }

    #[test]
    fn subscribers_are_called_in_subscription_order() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        let config = MonitorConfig::default().with_refresh_period(Duration::from_secs(60));
        let monitor = start(&connector, &address, config);

        // (snapshot identity, subscriber index) per callback
        let seen = Arc::new(Mutex::new(Vec::<(usize, i32)>::new()));
        let (tx, rx) = mpsc::channel();
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            let tx = tx.clone();
            monitor.attach_fn(move |s| {
                let id = s.map_or(0, |s| Arc::as_ptr(s) as usize);
                seen.lock().unwrap().push((id, i));
                let _ = tx.send(());
            });
        }

        let full_cycle = loop {
            rx.recv_timeout(WAIT).unwrap();
            let seen = seen.lock().unwrap();
            let mut groups: Vec<Vec<i32>> = Vec::new();
            let mut last = None;
            for &(id, i) in seen.iter() {
                if last != Some(id) {
                    groups.push(Vec::new());
                    last = Some(id);
                }
                if let Some(group) = groups.last_mut() {
                    group.push(i);
                }
            }
            assert!(groups.iter().all(|g| g.windows(2).all(|w| w[0] < w[1])));
            if let Some(group) = groups.into_iter().find(|g| g.len() == 3) {
                break group;
            }
        };
        assert_eq!(full_cycle, vec![0, 1, 2]);
        monitor.exit();
    }

    #[test]
    fn kills_queued_before_a_cycle_precede_its_snapshot() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        let config = MonitorConfig::default().with_refresh_period(Duration::from_secs(60));
        let monitor = start(&connector, &address, config);

        monitor.kill(KillRequest::query(QueryId(11)));
        assert_eq!(monitor.pending_kills(), 1);

        let (_sub, rx) = channel(&monitor);
        let snapshot = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(monitor.pending_kills(), 0);
        assert_eq!(connector.killed(&address), vec!["query-11".to_string()]);
        assert!(snapshot.query(QueryId(11)).is_none());
        assert!(snapshot.query(QueryId(12)).is_some());
        monitor.exit();
    }

    #[test]
    fn kill_survives_an_unreachable_cycle() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        connector.set_reachable(&address, false);
        let config = MonitorConfig::default().with_refresh_period(Duration::from_secs(60));
        let monitor = start(&connector, &address, config);

        monitor.kill(KillRequest::query(QueryId(11)));
        let (_sub, rx) = channel(&monitor);
        assert!(rx.recv_timeout(WAIT).unwrap().is_none());
        assert_eq!(monitor.pending_kills(), 1);
        assert!(connector.killed(&address).is_empty());

        connector.set_reachable(&address, true);
        monitor.refresh_now();
        let snapshot = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(monitor.pending_kills(), 0);
        assert_eq!(connector.killed(&address), vec!["query-11".to_string()]);
        assert!(snapshot.query(QueryId(11)).is_none());
        monitor.exit();
    }

    #[test]
    fn kills_are_not_sent_to_servers_without_kill_support() {
        let address = Address::new("ce", 7474);
        let connector = MockConnector::standalone_community(address.clone());
        let config = MonitorConfig::default().with_refresh_period(Duration::from_secs(60));
        let monitor = start(&connector, &address, config);

        monitor.kill(KillRequest::query(QueryId(1)));
        let (_sub, rx) = channel(&monitor);
        assert!(rx.recv_timeout(WAIT).unwrap().is_some());
        assert_eq!(monitor.pending_kills(), 0);
        assert!(
            !connector
                .statements(&address)
                .contains(&crate::collector::KILL_QUERY.to_string())
        );
        monitor.exit();
    }

    #[test]
    fn idle_transaction_yields_no_kill_request() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        let monitor = start(&connector, &address, MonitorConfig::default());
        let (_sub, rx) = channel(&monitor);
        let snapshot = rx.recv_timeout(WAIT).unwrap().unwrap();

        let items = snapshot.transactions.as_ref().unwrap().items.as_ref().unwrap();
        assert_eq!(
            KillRequest::for_transaction(&items[0]),
            Some(KillRequest::query(QueryId(11)))
        );
        assert_eq!(KillRequest::for_transaction(&items[1]), None);
        monitor.exit();
    }

    #[test]
    fn unreachable_endpoint_reports_error_then_recovers() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        connector.set_reachable(&address, false);
        let config = MonitorConfig::default().with_refresh_period(Duration::from_secs(60));
        let monitor = start(&connector, &address, config);

        let (tx, rx) = mpsc::channel();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new()), tx));
        monitor.attach(recorder.clone());
        rx.recv_timeout(WAIT).unwrap();

        {
            let events = recorder.0.lock().unwrap();
            assert!(matches!(events[0], Event::Error(MonitorError::Unreachable(_))));
            assert_eq!(events[1], Event::Refresh(false));
        }
        assert_eq!(monitor.latest(), None);
        assert_eq!(monitor.phase(), MonitorPhase::Error);
        assert!(monitor.last_error().is_some());

        connector.set_reachable(&address, true);
        monitor.refresh_now();
        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(recorder.0.lock().unwrap().last(), Some(&Event::Refresh(true)));
        assert!(monitor.latest().is_some());
        assert_eq!(monitor.last_error(), None);
        monitor.exit();
    }

    #[test]
    fn connection_is_dropped_only_for_connectivity_failures() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        let config = MonitorConfig::default().with_refresh_period(Duration::from_secs(60));
        let monitor = start(&connector, &address, config);
        let (_sub, rx) = channel(&monitor);
        assert!(rx.recv_timeout(WAIT).unwrap().is_some());

        // Missing metric: the connection survives.
        let saved = connector.server(&address).unwrap().jmx;
        connector.update(&address, |s| s.jmx.clear());
        monitor.refresh_now();
        assert!(rx.recv_timeout(WAIT).unwrap().is_none());
        assert!(matches!(
            monitor.last_error(),
            Some(MonitorError::MissingMetric { .. })
        ));
        assert_eq!(connector.connects(&address), 1);

        // Lost connectivity: the next cycle reconnects.
        connector.update(&address, |s| s.jmx = saved);
        connector.set_reachable(&address, false);
        monitor.refresh_now();
        assert!(rx.recv_timeout(WAIT).unwrap().is_none());
        connector.set_reachable(&address, true);
        monitor.refresh_now();
        assert!(rx.recv_timeout(WAIT).unwrap().is_some());
        assert_eq!(connector.connects(&address), 2);
        monitor.exit();
    }

    #[test]
    fn query_failure_drops_the_connection_and_reconnects() {
        const MARKED_AS_FAILED: &str = "Neo.ClientError.Transaction.TransactionMarkedAsFailed";
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        let config = MonitorConfig::default().with_refresh_period(Duration::from_secs(60));
        let monitor = start(&connector, &address, config);

        let (tx, rx) = mpsc::channel();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new()), tx));
        monitor.attach(recorder.clone());
        rx.recv_timeout(WAIT).unwrap();

        connector.fail_next(&address, "dbms.queryJmx", MARKED_AS_FAILED);
        monitor.refresh_now();
        rx.recv_timeout(WAIT).unwrap();
        assert!(matches!(
            monitor.last_error(),
            Some(MonitorError::TransientQueryFailure { ref code, .. }) if code == MARKED_AS_FAILED
        ));
        assert_eq!(monitor.latest(), None);

        monitor.refresh_now();
        rx.recv_timeout(WAIT).unwrap();
        assert!(monitor.latest().is_some());
        assert_eq!(connector.connects(&address), 2);

        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], Event::Refresh(true));
        assert!(matches!(events[1], Event::Error(MonitorError::TransientQueryFailure { .. })));
        assert_eq!(events[2], Event::Refresh(false));
        assert_eq!(events[3], Event::Refresh(true));
        drop(events);
        monitor.exit();
    }

    #[test]
    fn exit_with_cycle_in_flight_publishes_nothing() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        connector.set_latency(&address, Duration::from_millis(200));
        let monitor = start(&connector, &address, fast_config());

        let calls = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&calls);
        monitor.attach_fn(move |_| *counter.lock().unwrap() += 1);

        let deadline = Instant::now() + WAIT;
        while connector.statements(&address).is_empty() {
            assert!(Instant::now() < deadline, "first statement never issued");
            thread::sleep(Duration::from_millis(5));
        }
        monitor.exit();
        assert!(!monitor.is_running());
        assert_eq!(monitor.phase(), MonitorPhase::Stopped);

        let after_exit = *calls.lock().unwrap();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(*calls.lock().unwrap(), after_exit);
        assert_eq!(after_exit, 0);
        assert_eq!(monitor.cycles(), 0);

        // Idempotent.
        monitor.exit();
    }

    #[test]
    fn exit_from_a_callback_stops_the_loop() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        let monitor = start(&connector, &address, fast_config());

        let slot: Arc<OnceLock<Arc<EndpointMonitor>>> = Arc::new(OnceLock::new());
        let _ = slot.set(Arc::clone(&monitor));
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&slot);
        monitor.attach_fn(move |_| {
            if let Some(m) = inner.get() {
                m.exit();
            }
            let _ = tx.send(());
        });

        rx.recv_timeout(WAIT).unwrap();
        assert!(!monitor.is_running());
        // No further cycle follows.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        monitor.exit();
        assert_eq!(monitor.phase(), MonitorPhase::Stopped);
    }
}
