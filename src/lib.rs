//! graphtop - Neo4j monitoring engine.
//!
//! Samples JMX metrics, running queries, transactions and cluster membership
//! from Neo4j endpoints on background threads and publishes typed snapshots
//! to subscribers. Used by the `graphtop` binary.

pub mod collector;
pub mod config;
pub mod dashboard;
pub mod driver;
pub mod error;
pub mod highlight;
pub mod model;
pub mod monitor;
pub mod topology;

pub use config::{Address, Credentials, MonitorConfig, Target};
pub use dashboard::{Dashboard, Panel, PanelStatus, PanelView};
pub use error::MonitorError;
pub use highlight::{Highlight, HighlightAllocator};
pub use model::Snapshot;
pub use monitor::{EndpointMonitor, KillRequest, MonitorHandle, MonitorKey, Registry, Subscriber, Subscription};
pub use topology::Navigator;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
