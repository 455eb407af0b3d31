//! Host, JVM and DBMS identity metrics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating system, runtime and DBMS identity of one endpoint.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SystemInfo {
    pub os: OsInfo,
    pub runtime: RuntimeInfo,
    /// Absent when the server does not expose the threading bean.
    pub threads: Option<ThreadInfo>,
    pub dbms: DbmsInfo,
}

/// Operating system view of the server process.
///
/// Source: `java.lang:type=OperatingSystem`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct OsInfo {
    /// From `Name`.
    pub name: String,
    /// From `Version`.
    pub version: String,
    /// From `Arch`.
    pub arch: String,
    /// From `AvailableProcessors`.
    pub available_processors: u32,
    /// CPU time consumed by the server process in nanoseconds.
    /// From `ProcessCpuTime`.
    pub process_cpu_time_ns: u64,
    /// Fraction 0.0-1.0 of CPU used by the server process.
    /// From `ProcessCpuLoad`.
    pub process_cpu_load: f64,
    /// Fraction 0.0-1.0 of CPU used by the whole host.
    /// From `SystemCpuLoad`.
    pub system_cpu_load: f64,
    /// From `SystemLoadAverage` (-1 when unavailable).
    pub system_load_average: f64,
}

/// Source: `java.lang:type=Runtime`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct RuntimeInfo {
    pub vm_name: String,
    pub spec_version: String,
    /// JVM uptime in milliseconds.
    pub uptime_ms: u64,
}

/// Source: `java.lang:type=Threading`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ThreadInfo {
    pub daemon: u64,
    pub peak: u64,
    pub live: u64,
    pub total_started: u64,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Edition {
    Community,
    Enterprise,
}

impl Edition {
    /// Parses the `edition` column of `dbms.components`.
    pub fn from_component(s: &str) -> Option<Self> {
        match s {
            "community" => Some(Edition::Community),
            "enterprise" => Some(Edition::Enterprise),
            _ => None,
        }
    }

    /// Short label used in status lines.
    pub fn short(&self) -> &'static str {
        match self {
            Edition::Community => "CE",
            Edition::Enterprise => "EE",
        }
    }
}

/// Operating mode, from the `dbms.mode` setting.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum DbmsMode {
    #[default]
    Single,
    Ha,
    Arbiter,
    Core,
    ReadReplica,
}

impl DbmsMode {
    /// Unknown or missing values fall back to `Single`.
    pub fn from_setting(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "HA" => DbmsMode::Ha,
            "ARBITER" => DbmsMode::Arbiter,
            "CORE" => DbmsMode::Core,
            "READ_REPLICA" => DbmsMode::ReadReplica,
            _ => DbmsMode::Single,
        }
    }

    pub fn is_cluster_member(&self) -> bool {
        matches!(self, DbmsMode::Core | DbmsMode::ReadReplica)
    }
}

impl fmt::Display for DbmsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DbmsMode::Single => "SINGLE",
            DbmsMode::Ha => "HA",
            DbmsMode::Arbiter => "ARBITER",
            DbmsMode::Core => "CORE",
            DbmsMode::ReadReplica => "READ_REPLICA",
        };
        f.write_str(s)
    }
}

/// DBMS product identity.
///
/// Sources:
/// - `dbms.components()` - name, version, edition
/// - `org.neo4j:instance=kernel#0,name=Configuration` - `dbms.mode`
/// - `org.neo4j:instance=kernel#0,name=Kernel` - `KernelStartTime`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct DbmsInfo {
    pub product: String,
    pub version: String,
    pub edition: Edition,
    pub mode: DbmsMode,
    /// Epoch milliseconds.
    pub kernel_start_time_ms: i64,
}

impl DbmsInfo {
    /// `major.minor` part of the version, e.g. `3.5` for `3.5.3`.
    pub fn short_version(&self) -> &str {
        let mut dots = self.version.match_indices('.').map(|(i, _)| i);
        match (dots.next(), dots.next()) {
            (Some(_), Some(second)) => &self.version[..second],
            _ => &self.version,
        }
    }
}

/// Host and JVM memory.
///
/// Sources:
/// - `java.lang:type=OperatingSystem` - physical, swap, virtual
/// - `java.lang:type=Memory` - heap and non-heap usage
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct MemoryInfo {
    pub physical_total: u64,
    pub physical_free: u64,
    pub swap_total: u64,
    pub swap_free: u64,
    pub committed_virtual: u64,
    pub heap: MemoryUsage,
    pub non_heap: MemoryUsage,
}

/// One `java.lang.management.MemoryUsage` composite. All values in bytes.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct MemoryUsage {
    pub init: u64,
    pub used: u64,
    pub committed: u64,
    /// `None` when the JVM reports no limit (-1).
    pub max: Option<u64>,
}

impl MemoryUsage {
    /// Used bytes relative to the committed size.
    pub fn used_ratio(&self) -> f64 {
        if self.committed == 0 {
            0.0
        } else {
            self.used as f64 / self.committed as f64
        }
    }
}
