//! Snapshot model.
//!
//! A `Snapshot` is everything one sampling cycle learned about one endpoint.
//! It is built in one go by the collector, shared behind an `Arc` and never
//! mutated afterwards.

mod activity;
mod cluster;
mod storage;
mod system;

pub use activity::{
    QueryId, QueryInfo, TransactionCounters, TransactionId, TransactionInfo, TransactionList,
};
pub use cluster::{ClusterMember, ClusterOverview, Role};
pub use storage::{IdCounts, PageCacheInfo, StorageInfo, StoreSizes};
pub use system::{
    DbmsInfo, DbmsMode, Edition, MemoryInfo, MemoryUsage, OsInfo, RuntimeInfo, SystemInfo,
    ThreadInfo,
};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Address;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Snapshot {
    pub address: Address,
    /// Epoch milliseconds at the start of the cycle.
    pub sampled_at: i64,
    pub system: SystemInfo,
    pub memory: MemoryInfo,
    pub storage: StorageInfo,
    /// `None` on editions without `dbms.listQueries`.
    pub queries: Option<Vec<QueryInfo>>,
    /// `None` when the transactions bean is not exposed.
    pub transactions: Option<TransactionList>,
    pub page_cache: Option<PageCacheInfo>,
    /// Present only for cluster members.
    pub cluster: Option<ClusterOverview>,
}

impl Snapshot {
    pub fn is_enterprise(&self) -> bool {
        self.system.dbms.edition == Edition::Enterprise
    }

    pub fn is_cluster_member(&self) -> bool {
        self.cluster.is_some()
    }

    /// Time since the kernel started, as of `sampled_at`.
    pub fn dbms_uptime(&self) -> Duration {
        let ms = self.sampled_at - self.system.dbms.kernel_start_time_ms;
        Duration::from_millis(ms.max(0) as u64)
    }

    pub fn jvm_uptime(&self) -> Duration {
        Duration::from_millis(self.system.runtime.uptime_ms)
    }

    /// Heap used relative to the committed heap.
    pub fn heap_used_ratio(&self) -> f64 {
        self.memory.heap.used_ratio()
    }

    pub fn process_cpu_percent(&self) -> f64 {
        self.system.os.process_cpu_load * 100.0
    }

    pub fn system_cpu_percent(&self) -> f64 {
        self.system.os.system_cpu_load * 100.0
    }

    pub fn query(&self, id: QueryId) -> Option<&QueryInfo> {
        self.queries.as_ref()?.iter().find(|q| q.id == id)
    }

    /// Product, short version and edition, e.g. `Neo4j 3.5 EE`.
    pub fn status_label(&self) -> String {
        format!(
            "{} {} {}",
            self.system.dbms.product,
            self.system.dbms.short_version(),
            self.system.dbms.edition.short()
        )
    }
}
