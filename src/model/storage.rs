//! Store files, id usage and page cache.

use serde::{Deserialize, Serialize};

/// Store and file-descriptor state.
///
/// Sources:
/// - `java.lang:type=OperatingSystem` - file descriptors
/// - `org.neo4j:instance=kernel#0,name=Kernel` - database identity
/// - `org.neo4j:instance=kernel#0,name=Store sizes`
/// - `org.neo4j:instance=kernel#0,name=Primitive count`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct StorageInfo {
    pub open_file_descriptors: u64,
    pub max_file_descriptors: u64,
    pub database_name: String,
    pub read_only: bool,
    pub store_id: String,
    /// Epoch milliseconds; `None` when the server reports it in another form.
    pub store_creation_ms: Option<i64>,
    pub sizes: StoreSizes,
    pub ids: IdCounts,
}

impl StorageInfo {
    pub fn file_descriptor_ratio(&self) -> f64 {
        if self.max_file_descriptors == 0 {
            0.0
        } else {
            self.open_file_descriptors as f64 / self.max_file_descriptors as f64
        }
    }
}

/// Store file sizes in bytes.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct StoreSizes {
    pub array: u64,
    pub count: u64,
    pub index: u64,
    pub label: u64,
    pub node: u64,
    pub property: u64,
    pub relationship: u64,
    pub schema: u64,
    pub string: u64,
    pub total: u64,
    pub transaction_logs: u64,
}

/// Ids in use per primitive kind.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct IdCounts {
    pub nodes: u64,
    pub properties: u64,
    pub relationships: u64,
    pub relationship_types: u64,
}

/// Page cache counters. Enterprise only.
///
/// Source: `org.neo4j:instance=kernel#0,name=Page cache`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct PageCacheInfo {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub evictions: u64,
    pub eviction_exceptions: u64,
    pub faults: u64,
    pub file_mappings: u64,
    pub file_unmappings: u64,
    pub flushes: u64,
    /// Older servers omit `Hits`, `Unpins` and `UsageRatio`.
    pub hits: Option<u64>,
    pub pins: u64,
    pub unpins: Option<u64>,
    pub hit_ratio: f64,
    pub usage_ratio: Option<f64>,
}
