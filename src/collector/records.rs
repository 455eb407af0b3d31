//! Field mapping from procedure rows and JMX beans into the snapshot model.

use crate::driver::Record;
use crate::error::MonitorError;
use crate::model::{
    ClusterMember, DbmsInfo, DbmsMode, Edition, IdCounts, MemoryInfo, MemoryUsage, OsInfo,
    PageCacheInfo, QueryId, QueryInfo, Role, RuntimeInfo, StorageInfo, StoreSizes, ThreadInfo,
    TransactionCounters, TransactionId, TransactionInfo,
};

use super::jmx::{CONFIGURATION, Fields, JmxBeans, KERNEL, MEMORY, PRIMITIVE_COUNT, STORE_SIZES};

pub(crate) const COMPONENTS_SOURCE: &str = "dbms.components";
pub(crate) const QUERIES_SOURCE: &str = "dbms.listQueries";
pub(crate) const TRANSACTIONS_SOURCE: &str = "dbms.listTransactions";
pub(crate) const OVERVIEW_SOURCE: &str = "dbms.cluster.overview";

pub fn os_info(os: &Fields<'_>) -> Result<OsInfo, MonitorError> {
    Ok(OsInfo {
        name: os.string("Name")?,
        version: os.string("Version")?,
        arch: os.string("Arch")?,
        available_processors: os.u32("AvailableProcessors")?,
        process_cpu_time_ns: os.u64("ProcessCpuTime")?,
        process_cpu_load: os.f64("ProcessCpuLoad")?,
        system_cpu_load: os.f64("SystemCpuLoad")?,
        system_load_average: os.f64("SystemLoadAverage")?,
    })
}

pub fn runtime_info(runtime: &Fields<'_>) -> Result<RuntimeInfo, MonitorError> {
    Ok(RuntimeInfo {
        vm_name: runtime.string("VmName")?,
        spec_version: runtime.string("SpecVersion")?,
        uptime_ms: runtime.u64("Uptime")?,
    })
}

pub fn thread_info(threading: &Fields<'_>) -> Result<ThreadInfo, MonitorError> {
    Ok(ThreadInfo {
        daemon: threading.u64("DaemonThreadCount")?,
        peak: threading.u64("PeakThreadCount")?,
        live: threading.u64("ThreadCount")?,
        total_started: threading.u64("TotalStartedThreadCount")?,
    })
}

/// Product identity from the first `dbms.components()` row.
pub fn dbms_info(components: &[Record], beans: &JmxBeans) -> Result<DbmsInfo, MonitorError> {
    let row = components
        .first()
        .map(|r| Fields::new(COMPONENTS_SOURCE, r))
        .ok_or_else(|| MonitorError::missing_bean(COMPONENTS_SOURCE))?;

    let name = row.string("name")?;
    let product = match name.as_str() {
        "Neo4j Kernel" => "Neo4j".to_string(),
        _ => name,
    };
    let version = row
        .strings("versions")
        .into_iter()
        .next()
        .ok_or_else(|| MonitorError::missing_key(COMPONENTS_SOURCE, "versions"))?;
    let edition = Edition::from_component(&row.string("edition")?)
        .ok_or_else(|| MonitorError::missing_key(COMPONENTS_SOURCE, "edition"))?;
    let mode = beans
        .get(CONFIGURATION)
        .and_then(|config| config.opt_text("dbms.mode"))
        .map(|s| DbmsMode::from_setting(&s))
        .unwrap_or_default();
    let kernel_start_time_ms = beans.require(KERNEL)?.i64("KernelStartTime")?;

    Ok(DbmsInfo {
        product,
        version,
        edition,
        mode,
        kernel_start_time_ms,
    })
}

fn memory_usage(usage: &Fields<'_>) -> Result<MemoryUsage, MonitorError> {
    Ok(MemoryUsage {
        init: usage.u64("init")?,
        used: usage.u64("used")?,
        committed: usage.u64("committed")?,
        max: usage.opt_u64("max"),
    })
}

pub fn memory_info(os: &Fields<'_>, beans: &JmxBeans) -> Result<MemoryInfo, MonitorError> {
    let memory = beans.require(MEMORY)?;
    Ok(MemoryInfo {
        physical_total: os.u64("TotalPhysicalMemorySize")?,
        physical_free: os.u64("FreePhysicalMemorySize")?,
        swap_total: os.u64("TotalSwapSpaceSize")?,
        swap_free: os.u64("FreeSwapSpaceSize")?,
        committed_virtual: os.u64("CommittedVirtualMemorySize")?,
        heap: memory_usage(&memory.composite("HeapMemoryUsage")?)?,
        non_heap: memory_usage(&memory.composite("NonHeapMemoryUsage")?)?,
    })
}

pub fn storage_info(os: &Fields<'_>, beans: &JmxBeans) -> Result<StorageInfo, MonitorError> {
    let kernel = beans.require(KERNEL)?;
    let stores = beans.require(STORE_SIZES)?;
    let primitives = beans.require(PRIMITIVE_COUNT)?;
    Ok(StorageInfo {
        open_file_descriptors: os.u64("OpenFileDescriptorCount")?,
        max_file_descriptors: os.u64("MaxFileDescriptorCount")?,
        database_name: kernel.string("DatabaseName")?,
        read_only: kernel.bool("ReadOnly")?,
        store_id: kernel.string("StoreId")?,
        store_creation_ms: kernel.opt_i64("StoreCreationDate"),
        sizes: StoreSizes {
            array: stores.u64("ArrayStoreSize")?,
            count: stores.u64("CountStoreSize")?,
            index: stores.u64("IndexStoreSize")?,
            label: stores.u64("LabelStoreSize")?,
            node: stores.u64("NodeStoreSize")?,
            property: stores.u64("PropertyStoreSize")?,
            relationship: stores.u64("RelationshipStoreSize")?,
            schema: stores.u64("SchemaStoreSize")?,
            string: stores.u64("StringStoreSize")?,
            total: stores.u64("TotalStoreSize")?,
            transaction_logs: stores.u64("TransactionLogsSize")?,
        },
        ids: IdCounts {
            nodes: primitives.u64("NumberOfNodeIdsInUse")?,
            properties: primitives.u64("NumberOfPropertyIdsInUse")?,
            relationships: primitives.u64("NumberOfRelationshipIdsInUse")?,
            relationship_types: primitives.u64("NumberOfRelationshipTypeIdsInUse")?,
        },
    })
}

pub fn transaction_counters(bean: &Fields<'_>) -> Result<TransactionCounters, MonitorError> {
    Ok(TransactionCounters {
        last_committed_id: bean.u64("LastCommittedTxId")?,
        opened: bean.u64("NumberOfOpenedTransactions")?,
        open: bean.u64("NumberOfOpenTransactions")?,
        committed: bean.u64("NumberOfCommittedTransactions")?,
        rolled_back: bean.u64("NumberOfRolledBackTransactions")?,
        peak_concurrent: bean.u64("PeakNumberOfConcurrentTransactions")?,
    })
}

pub fn page_cache_info(bean: &Fields<'_>) -> Result<PageCacheInfo, MonitorError> {
    Ok(PageCacheInfo {
        bytes_read: bean.u64("BytesRead")?,
        bytes_written: bean.u64("BytesWritten")?,
        evictions: bean.u64("Evictions")?,
        eviction_exceptions: bean.u64("EvictionExceptions")?,
        faults: bean.u64("Faults")?,
        file_mappings: bean.u64("FileMappings")?,
        file_unmappings: bean.u64("FileUnmappings")?,
        flushes: bean.u64("Flushes")?,
        hits: bean.opt_u64("Hits"),
        pins: bean.u64("Pins")?,
        unpins: bean.opt_u64("Unpins"),
        hit_ratio: bean.f64("HitRatio")?,
        usage_ratio: bean.opt_f64("UsageRatio"),
    })
}

pub fn query_info(record: &Record) -> Result<QueryInfo, MonitorError> {
    let row = Fields::new(QUERIES_SOURCE, record);
    Ok(QueryInfo {
        id: row
            .string("queryId")?
            .parse::<QueryId>()
            .map_err(|_| MonitorError::missing_key(QUERIES_SOURCE, "queryId"))?,
        user: row.text("username"),
        client_address: row.text("clientAddress"),
        request_uri: row.text("requestUri"),
        protocol: row.text("protocol"),
        planner: row.text("planner"),
        runtime: row.text("runtime"),
        allocated_bytes: row.opt_u64("allocatedBytes"),
        active_lock_count: row.opt_u64("activeLockCount").unwrap_or(0),
        page_hits: row.opt_u64("pageHits").unwrap_or(0),
        page_faults: row.opt_u64("pageFaults").unwrap_or(0),
        elapsed_ms: row.opt_u64("elapsedTimeMillis").unwrap_or(0),
        cpu_ms: row.opt_u64("cpuTimeMillis"),
        wait_ms: row.opt_u64("waitTimeMillis"),
        idle_ms: row.opt_u64("idleTimeMillis"),
        status: row.text("status"),
        text: row.text("query"),
        start_time: row.text("startTime"),
        metadata: row.json("metaData"),
        parameters: row.json("parameters"),
    })
}

pub fn transaction_info(record: &Record) -> Result<TransactionInfo, MonitorError> {
    let row = Fields::new(TRANSACTIONS_SOURCE, record);
    // An idle transaction reports an empty current query id.
    let current_query_id = match row.opt_text("currentQueryId") {
        Some(id) => Some(
            id.parse::<QueryId>()
                .map_err(|_| MonitorError::missing_key(TRANSACTIONS_SOURCE, "currentQueryId"))?,
        ),
        None => None,
    };
    Ok(TransactionInfo {
        id: row
            .string("transactionId")?
            .parse::<TransactionId>()
            .map_err(|_| MonitorError::missing_key(TRANSACTIONS_SOURCE, "transactionId"))?,
        user: row.text("username"),
        client_address: row.text("clientAddress"),
        request_uri: row.text("requestUri"),
        protocol: row.text("protocol"),
        current_query_id,
        current_query: row.opt_text("currentQuery"),
        active_lock_count: row.opt_u64("activeLockCount").unwrap_or(0),
        status: row.text("status"),
        elapsed_ms: row.opt_u64("elapsedTimeMillis").unwrap_or(0),
        cpu_ms: row.opt_u64("cpuTimeMillis"),
        wait_ms: row.opt_u64("waitTimeMillis"),
        idle_ms: row.opt_u64("idleTimeMillis"),
        allocated_bytes: row.opt_u64("allocatedBytes"),
        allocated_direct_bytes: row.opt_u64("allocatedDirectBytes"),
        page_hits: row.opt_u64("pageHits").unwrap_or(0),
        page_faults: row.opt_u64("pageFaults").unwrap_or(0),
        start_time: row.text("startTime"),
        metadata: row.json("metaData"),
    })
}

pub fn cluster_member(record: &Record) -> Result<ClusterMember, MonitorError> {
    let row = Fields::new(OVERVIEW_SOURCE, record);
    let role = Role::from_overview(&row.string("role")?)
        .ok_or_else(|| MonitorError::missing_key(OVERVIEW_SOURCE, "role"))?;
    Ok(ClusterMember {
        id: row.string("id")?,
        role,
        addresses: row.strings("addresses"),
        groups: row.strings("groups"),
    })
}
