//! Dashboard state: the panels, the overview and the highlight pool.
//!
//! Owns the registry. Rendering is left to the caller; every state change
//! pushed by a monitor is followed by a call to the redraw callback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::config::{Address, Credentials, MonitorConfig, Target};
use crate::driver::Connector;
use crate::error::MonitorError;
use crate::highlight::{Highlight, HighlightAllocator};
use crate::model::Snapshot;
use crate::monitor::{KillRequest, MonitorHandle, Registry, Subscriber, Subscription};
use crate::topology::Navigator;

type RedrawFn = Arc<dyn Fn() + Send + Sync>;

/// Redraw callback slot shared with every subscriber.
#[derive(Clone, Default)]
struct Redraw(Arc<Mutex<Option<RedrawFn>>>);

impl Redraw {
    fn set(&self, f: RedrawFn) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(f);
    }

    fn signal(&self) {
        let f = self.0.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(f) = f {
            f();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelStatus {
    Connecting,
    Live,
    Unavailable,
}

/// What a panel currently shows.
#[derive(Debug, Clone)]
pub struct PanelView {
    pub latest: Option<Arc<Snapshot>>,
    pub error: Option<String>,
    pub status: PanelStatus,
}

impl Default for PanelView {
    fn default() -> Self {
        Self {
            latest: None,
            error: None,
            status: PanelStatus::Connecting,
        }
    }
}

struct PanelFeed {
    view: Arc<Mutex<PanelView>>,
    redraw: Redraw,
}

impl Subscriber for PanelFeed {
    fn on_refresh(&self, snapshot: Option<&Arc<Snapshot>>) {
        {
            let mut view = self.view.lock().unwrap_or_else(PoisonError::into_inner);
            match snapshot {
                Some(snapshot) => {
                    view.latest = Some(Arc::clone(snapshot));
                    view.error = None;
                    view.status = PanelStatus::Live;
                }
                None => {
                    view.latest = None;
                    view.status = PanelStatus::Unavailable;
                }
            }
        }
        self.redraw.signal();
    }

    fn on_error(&self, error: &MonitorError) {
        let mut view = self.view.lock().unwrap_or_else(PoisonError::into_inner);
        view.error = Some(error.to_string());
    }
}

struct OverviewFeed {
    navigator: Arc<Mutex<Navigator>>,
    redraw: Redraw,
}

impl Subscriber for OverviewFeed {
    fn on_refresh(&self, snapshot: Option<&Arc<Snapshot>>) {
        let changed = self
            .navigator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rebuild(snapshot.map(Arc::as_ref));
        if changed {
            debug!("topology changed");
        }
        self.redraw.signal();
    }
}

/// One endpoint shown in detail.
pub struct Panel {
    address: Address,
    highlight: Highlight,
    handle: MonitorHandle,
    subscription: Subscription,
    view: Arc<Mutex<PanelView>>,
}

impl Panel {
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn highlight(&self) -> Highlight {
        self.highlight
    }

    pub fn monitor(&self) -> &MonitorHandle {
        &self.handle
    }

    pub fn view(&self) -> PanelView {
        self.view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct Overview {
    handle: MonitorHandle,
    subscription: Subscription,
}

pub struct Dashboard {
    registry: Registry,
    credentials: Credentials,
    primary: Address,
    highlights: HighlightAllocator,
    navigator: Arc<Mutex<Navigator>>,
    panels: Vec<Panel>,
    focused_panel: usize,
    overview: Option<Overview>,
    redraw: Redraw,
}

impl Dashboard {
    /// Starts monitoring `address` in a single highlighted panel.
    pub fn new(
        connector: Arc<dyn Connector>,
        config: MonitorConfig,
        address: Address,
        credentials: Credentials,
    ) -> Result<Self, MonitorError> {
        let registry = Registry::new(connector, config);
        let navigator = Navigator::new(address.clone()).with_scheme(registry.scheme());
        let mut dashboard = Self {
            registry,
            credentials,
            primary: address.clone(),
            highlights: HighlightAllocator::default(),
            navigator: Arc::new(Mutex::new(navigator)),
            panels: Vec::new(),
            focused_panel: 0,
            overview: None,
            redraw: Redraw::default(),
        };
        let highlight = dashboard
            .highlights
            .assign(&address)
            .ok_or(MonitorError::HighlightsExhausted)?;
        let panel = dashboard.open_panel(address, highlight)?;
        dashboard.panels.push(panel);
        Ok(dashboard)
    }

    /// Called after every change pushed by a monitor.
    pub fn set_redraw<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.redraw.set(Arc::new(f));
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn primary(&self) -> &Address {
        &self.primary
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn focused_panel(&self) -> Option<&Panel> {
        self.panels.get(self.focused_panel)
    }

    pub fn highlights(&self) -> &HighlightAllocator {
        &self.highlights
    }

    pub fn overview_visible(&self) -> bool {
        self.overview.is_some()
    }

    pub fn navigator(&self) -> MutexGuard<'_, Navigator> {
        self.navigator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_panel(&self, address: Address, highlight: Highlight) -> Result<Panel, MonitorError> {
        let handle = self
            .registry
            .acquire(&Target::direct(address.clone()), &self.credentials)?;
        let view = Arc::new(Mutex::new(PanelView::default()));
        let subscription = handle.attach(Arc::new(PanelFeed {
            view: Arc::clone(&view),
            redraw: self.redraw.clone(),
        }));
        debug!(address = %address, highlight = highlight.name(), "panel opened");
        Ok(Panel {
            address,
            highlight,
            handle,
            subscription,
            view,
        })
    }

    fn close_panel(&self, panel: Panel) {
        panel.handle.detach(panel.subscription);
        self.registry.release(panel.handle);
        debug!(address = %panel.address, "panel closed");
    }

    /// Shows or hides the cluster overview. Returns whether it is visible
    /// afterwards.
    pub fn toggle_overview(&mut self) -> Result<bool, MonitorError> {
        match self.overview.take() {
            Some(overview) => {
                overview.handle.detach(overview.subscription);
                self.registry.release(overview.handle);
                let focused = self.navigator().focused_address().cloned();
                self.focused_panel = focused
                    .and_then(|a| self.panel_index(&a))
                    .unwrap_or(0);
                Ok(false)
            }
            None => {
                let handle = self
                    .registry
                    .acquire(&Target::routing(self.primary.clone()), &self.credentials)?;
                {
                    let mut navigator = self.navigator();
                    navigator.rebuild(handle.latest().as_deref());
                    if let Some(panel) = self.panels.get(self.focused_panel) {
                        navigator.focus(&panel.address);
                    }
                }
                let subscription = handle.attach(Arc::new(OverviewFeed {
                    navigator: Arc::clone(&self.navigator),
                    redraw: self.redraw.clone(),
                }));
                self.overview = Some(Overview {
                    handle,
                    subscription,
                });
                Ok(true)
            }
        }
    }

    fn panel_index(&self, address: &Address) -> Option<usize> {
        self.panels.iter().position(|p| &p.address == address)
    }

    /// Opens a panel for the member focused in the overview. Returns false
    /// when there is nothing to open: no overview, a panel already open, or
    /// no highlight left.
    pub fn track_focused(&mut self) -> Result<bool, MonitorError> {
        if self.overview.is_none() {
            return Ok(false);
        }
        let Some(address) = self.navigator().focused_address().cloned() else {
            return Ok(false);
        };
        if self.highlights.get(&address).is_some() {
            return Ok(false);
        }
        let Some(highlight) = self.highlights.assign(&address) else {
            info!(address = %address, "no highlight left");
            return Ok(false);
        };
        match self.open_panel(address.clone(), highlight) {
            Ok(panel) => {
                self.panels.push(panel);
                self.arrange_panels();
                Ok(true)
            }
            Err(e) => {
                self.highlights.unassign(&address);
                Err(e)
            }
        }
    }

    /// Closes the panel of the focused address. The last panel is never
    /// closed.
    pub fn untrack_focused(&mut self) -> bool {
        if self.panels.len() <= 1 {
            return false;
        }
        let address = if self.overview.is_some() {
            self.navigator().focused_address().cloned()
        } else {
            self.focused_panel().map(|p| p.address.clone())
        };
        let Some(index) = address.and_then(|a| self.panel_index(&a)) else {
            return false;
        };
        let panel = self.panels.remove(index);
        self.highlights.unassign(&panel.address);
        self.close_panel(panel);
        if self.focused_panel > index || self.focused_panel >= self.panels.len() {
            self.focused_panel = self.focused_panel.saturating_sub(1);
        }
        self.arrange_panels();
        true
    }

    /// Orders panels like the topology; panels for addresses outside the
    /// topology stay in front.
    fn arrange_panels(&mut self) {
        let focused = self.focused_panel().map(|p| p.address.clone());
        let order: Vec<Address> = self
            .navigator()
            .tracked(&self.highlights)
            .into_iter()
            .map(|(a, _)| a)
            .collect();
        self.panels.sort_by_key(|p| {
            order
                .iter()
                .position(|a| a == &p.address)
                .map_or(0, |i| i + 1)
        });
        if let Some(index) = focused.and_then(|a| self.panel_index(&a)) {
            self.focused_panel = index;
        }
    }

    fn move_panel_focus(&mut self, target: usize) -> bool {
        if self.panels.len() <= 1 || self.focused_panel == target {
            return false;
        }
        self.focused_panel = target;
        true
    }

    pub fn home(&mut self) -> bool {
        if self.overview.is_some() {
            return self.navigator().home();
        }
        self.move_panel_focus(0)
    }

    pub fn end(&mut self) -> bool {
        if self.overview.is_some() {
            return self.navigator().end();
        }
        self.move_panel_focus(self.panels.len().saturating_sub(1))
    }

    pub fn page_up(&mut self) -> bool {
        if self.overview.is_some() {
            return self.navigator().page_up();
        }
        let n = self.panels.len().max(1);
        self.move_panel_focus((self.focused_panel + n - 1) % n)
    }

    pub fn page_down(&mut self) -> bool {
        if self.overview.is_some() {
            return self.navigator().page_down();
        }
        let n = self.panels.len().max(1);
        self.move_panel_focus((self.focused_panel + 1) % n)
    }

    /// Queues `request` on the focused panel's monitor.
    pub fn kill_in_focused(&self, request: KillRequest) -> bool {
        match self.focused_panel() {
            Some(panel) => {
                info!(address = %panel.address, query = %request.query_id, "kill requested");
                panel.handle.kill(request);
                true
            }
            None => false,
        }
    }

    /// Releases the overview and every panel. No callback runs after this
    /// returns.
    pub fn exit(&mut self) {
        if let Some(overview) = self.overview.take() {
            overview.handle.detach(overview.subscription);
            self.registry.release(overview.handle);
        }
        for panel in std::mem::take(&mut self.panels) {
            self.highlights.unassign(&panel.address);
            self.close_panel(panel);
        }
        self.focused_panel = 0;
        self.registry.shutdown();
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{ClusterLayout, MockConnector};
    use crate::model::QueryId;
    use crate::monitor::tests::{WAIT, fast_config};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn eventually(f: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        f()
    }

    fn cluster_dashboard() -> (Dashboard, MockConnector, ClusterLayout) {
        let (connector, layout) = MockConnector::causal_cluster();
        let dashboard = Dashboard::new(
            Arc::new(connector.clone()),
            fast_config(),
            layout.leader.clone(),
            Credentials::new("neo4j", "secret"),
        )
        .unwrap();
        (dashboard, connector, layout)
    }

    fn with_overview(dashboard: &mut Dashboard) {
        assert!(dashboard.toggle_overview().unwrap());
        assert!(eventually(|| dashboard.navigator().len() == 4));
    }

    fn panel_addresses(dashboard: &Dashboard) -> Vec<Address> {
        dashboard.panels().iter().map(|p| p.address().clone()).collect()
    }

    #[test]
    fn primary_panel_goes_live() {
        let (dashboard, _, layout) = cluster_dashboard();
        let redraws = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&redraws);
        dashboard.set_redraw(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(panel_addresses(&dashboard), vec![layout.leader.clone()]);
        let panel = dashboard.focused_panel().unwrap();
        assert_eq!(panel.highlight().name(), "member-1");
        assert!(eventually(|| panel.view().status == PanelStatus::Live));
        assert!(eventually(|| redraws.load(Ordering::SeqCst) > 0));
        assert!(!dashboard.overview_visible());
        assert_eq!(dashboard.registry().len(), 1);
    }

    #[test]
    fn overview_uses_its_own_monitor() {
        let (mut dashboard, _, _) = cluster_dashboard();
        with_overview(&mut dashboard);
        assert!(dashboard.overview_visible());
        assert!(dashboard.navigator().is_cluster());
        assert_eq!(dashboard.registry().len(), 2);

        assert!(!dashboard.toggle_overview().unwrap());
        assert!(!dashboard.overview_visible());
        assert_eq!(dashboard.registry().len(), 1);
    }

    #[test]
    fn tracking_opens_panels_in_topology_order() {
        let (mut dashboard, _, layout) = cluster_dashboard();
        with_overview(&mut dashboard);
        assert_eq!(dashboard.navigator().focused_address(), Some(&layout.leader));
        // Already tracked.
        assert!(!dashboard.track_focused().unwrap());

        assert!(dashboard.end());
        assert!(dashboard.track_focused().unwrap());
        assert!(dashboard.page_up());
        assert!(dashboard.track_focused().unwrap());
        assert_eq!(
            panel_addresses(&dashboard),
            vec![
                layout.leader.clone(),
                layout.followers[1].clone(),
                layout.read_replicas[0].clone(),
            ]
        );
        let names: Vec<&str> = dashboard.panels().iter().map(|p| p.highlight().name()).collect();
        assert_eq!(names, vec!["member-1", "member-3", "member-2"]);
        assert_eq!(dashboard.registry().len(), 4);

        assert!(dashboard.untrack_focused());
        assert_eq!(
            panel_addresses(&dashboard),
            vec![layout.leader.clone(), layout.read_replicas[0].clone()]
        );
        assert_eq!(dashboard.highlights().free_count(), 6);
        assert_eq!(dashboard.registry().len(), 3);
        // Nothing open for the focused member any more.
        assert!(!dashboard.untrack_focused());
    }

    #[test]
    fn toggling_off_focuses_the_matching_panel() {
        let (mut dashboard, _, layout) = cluster_dashboard();
        with_overview(&mut dashboard);
        assert!(dashboard.end());
        assert!(dashboard.track_focused().unwrap());

        dashboard.toggle_overview().unwrap();
        assert_eq!(
            dashboard.focused_panel().map(|p| p.address().clone()),
            Some(layout.read_replicas[0].clone())
        );

        // Back on: the overview cursor starts on the focused panel.
        dashboard.toggle_overview().unwrap();
        assert_eq!(
            dashboard.navigator().focused_address(),
            Some(&layout.read_replicas[0])
        );
    }

    #[test]
    fn panel_focus_wraps_without_overview() {
        let (mut dashboard, _, _) = cluster_dashboard();
        assert!(!dashboard.home());
        assert!(!dashboard.page_down());

        with_overview(&mut dashboard);
        assert!(dashboard.end());
        assert!(dashboard.track_focused().unwrap());
        dashboard.toggle_overview().unwrap();

        assert_eq!(dashboard.panels().len(), 2);
        assert!(dashboard.home());
        assert!(!dashboard.home());
        assert!(dashboard.page_up());
        assert!(!dashboard.end());
        assert!(dashboard.page_down());
        assert!(dashboard.untrack_focused());
        assert_eq!(dashboard.panels().len(), 1);
    }

    #[test]
    fn last_panel_is_never_closed() {
        let (mut dashboard, _, _) = cluster_dashboard();
        assert!(!dashboard.untrack_focused());
        assert_eq!(dashboard.panels().len(), 1);
        assert_eq!(dashboard.registry().len(), 1);
    }

    #[test]
    fn kill_reaches_the_focused_endpoint() {
        let (dashboard, connector, layout) = cluster_dashboard();
        let id: QueryId = "query-11".parse().unwrap();
        assert!(dashboard.kill_in_focused(KillRequest::query(id)));
        assert!(eventually(|| connector.killed(&layout.leader) == vec!["query-11".to_string()]));
    }

    #[test]
    fn unreachable_primary_shows_unavailable() {
        let (connector, layout) = MockConnector::causal_cluster();
        connector.set_reachable(&layout.leader, false);
        let dashboard = Dashboard::new(
            Arc::new(connector.clone()),
            fast_config(),
            layout.leader.clone(),
            Credentials::new("neo4j", "secret"),
        )
        .unwrap();
        let panel = dashboard.focused_panel().unwrap();
        assert!(eventually(|| panel.view().status == PanelStatus::Unavailable));
        assert!(panel.view().error.is_some());

        connector.set_reachable(&layout.leader, true);
        assert!(eventually(|| panel.view().status == PanelStatus::Live));
        assert_eq!(panel.view().error, None);
    }

    #[test]
    fn exit_releases_everything() {
        let (mut dashboard, connector, _) = cluster_dashboard();
        with_overview(&mut dashboard);
        assert!(dashboard.end());
        assert!(dashboard.track_focused().unwrap());

        let redraws = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&redraws);
        dashboard.set_redraw(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        dashboard.exit();
        assert!(dashboard.panels().is_empty());
        assert!(dashboard.registry().is_empty());
        assert_eq!(dashboard.highlights().assigned_count(), 0);

        let calls = connector.total_network_calls();
        let seen = redraws.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(connector.total_network_calls(), calls);
        assert_eq!(redraws.load(Ordering::SeqCst), seen);
        dashboard.exit();
    }
}
