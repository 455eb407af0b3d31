//! Canned server scenarios for the mock connector.

use serde_json::{Map, Value, json};

use super::{MockConnector, MockServer};
use crate::config::Address;

const KERNEL_BEAN_PREFIX: &str = "org.neo4j:instance=kernel#0,name=";

/// Builds a JMX bean row the way `dbms.queryJmx` returns it: every attribute
/// is wrapped as `{"description": ..., "value": ...}`.
pub fn bean(name: &str, attributes: Value) -> Value {
    let attributes: Map<String, Value> = match attributes {
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, json!({ "description": "", "value": v })))
            .collect(),
        _ => Map::new(),
    };
    json!({ "name": name, "description": "", "attributes": attributes })
}

fn memory_usage(init: u64, used: u64, committed: u64, max: i64) -> Value {
    json!({
        "description": "java.lang.management.MemoryUsage",
        "properties": { "init": init, "used": used, "committed": committed, "max": max }
    })
}

fn common_beans(mode: &str) -> Vec<Value> {
    vec![
        bean(
            "java.lang:type=OperatingSystem",
            json!({
                "Name": "Linux",
                "Version": "4.15.0-36-generic",
                "Arch": "amd64",
                "AvailableProcessors": 8,
                "ProcessCpuTime": 48_720_000_000u64,
                "ProcessCpuLoad": 0.021,
                "SystemCpuLoad": 0.134,
                "SystemLoadAverage": 0.87,
                "TotalPhysicalMemorySize": 33_588_854_784u64,
                "FreePhysicalMemorySize": 22_521_024_512u64,
                "TotalSwapSpaceSize": 34_221_322_240u64,
                "FreeSwapSpaceSize": 34_221_322_240u64,
                "CommittedVirtualMemorySize": 14_924_046_336u64,
                "MaxFileDescriptorCount": 40000,
                "OpenFileDescriptorCount": 515,
            }),
        ),
        bean(
            "java.lang:type=Runtime",
            json!({ "VmName": "OpenJDK 64-Bit Server VM", "SpecVersion": "1.8", "Uptime": 3_725_000 }),
        ),
        bean(
            "java.lang:type=Threading",
            json!({
                "DaemonThreadCount": 34,
                "PeakThreadCount": 61,
                "ThreadCount": 58,
                "TotalStartedThreadCount": 93,
            }),
        ),
        json!({
            "name": "java.lang:type=Memory",
            "description": "",
            "attributes": {
                "HeapMemoryUsage": {
                    "description": "",
                    "value": memory_usage(528_482_304, 203_423_848, 514_850_816, 7_456_948_224),
                },
                "NonHeapMemoryUsage": {
                    "description": "",
                    "value": memory_usage(2_555_904, 83_850_680, 87_293_952, -1),
                },
            }
        }),
        bean(
            &format!("{}Configuration", KERNEL_BEAN_PREFIX),
            json!({ "dbms.mode": mode }),
        ),
        bean(
            &format!("{}Kernel", KERNEL_BEAN_PREFIX),
            json!({
                "KernelStartTime": 1_539_860_000_000i64,
                "DatabaseName": "graph.db",
                "ReadOnly": false,
                "StoreCreationDate": 1_531_490_815_851i64,
                "StoreId": "9d2c8e7a5b1f3e40",
            }),
        ),
        bean(
            &format!("{}Store sizes", KERNEL_BEAN_PREFIX),
            json!({
                "ArrayStoreSize": 24_576,
                "CountStoreSize": 1_392,
                "IndexStoreSize": 65_536,
                "LabelStoreSize": 16_384,
                "NodeStoreSize": 163_840,
                "PropertyStoreSize": 2_375_680,
                "RelationshipStoreSize": 1_048_576,
                "SchemaStoreSize": 8_192,
                "StringStoreSize": 4_202_496,
                "TotalStoreSize": 12_812_337,
                "TransactionLogsSize": 4_907_065,
            }),
        ),
        bean(
            &format!("{}Primitive count", KERNEL_BEAN_PREFIX),
            json!({
                "NumberOfNodeIdsInUse": 11_134,
                "NumberOfPropertyIdsInUse": 57_890,
                "NumberOfRelationshipIdsInUse": 34_216,
                "NumberOfRelationshipTypeIdsInUse": 7,
            }),
        ),
    ]
}

fn enterprise_beans() -> Vec<Value> {
    vec![
        bean(
            &format!("{}Transactions", KERNEL_BEAN_PREFIX),
            json!({
                "LastCommittedTxId": 1,
                "NumberOfCommittedTransactions": 1312,
                "NumberOfOpenTransactions": 1,
                "NumberOfOpenedTransactions": 1321,
                "NumberOfRolledBackTransactions": 8,
                "PeakNumberOfConcurrentTransactions": 2,
            }),
        ),
        bean(
            &format!("{}Page cache", KERNEL_BEAN_PREFIX),
            json!({
                "BytesRead": 147_542,
                "BytesWritten": 8_192,
                "EvictionExceptions": 0,
                "Evictions": 0,
                "Faults": 19,
                "FileMappings": 36,
                "FileUnmappings": 19,
                "Flushes": 1,
                "HitRatio": 0.5778,
                "Hits": 26,
                "Pins": 71,
                "Unpins": 44,
                "UsageRatio": 1.24e-5,
            }),
        ),
    ]
}

fn sample_queries() -> Vec<Value> {
    vec![
        json!({
            "queryId": "query-11",
            "username": "neo4j",
            "metaData": {},
            "query": "MATCH (n:Person)-[:KNOWS*2..4]->(m) RETURN count(m)",
            "parameters": {},
            "planner": "cost",
            "runtime": "slotted",
            "indexes": [],
            "startTime": "2018-10-18T11:04:17.938Z",
            "protocol": "bolt",
            "clientAddress": "127.0.0.1:41758",
            "requestUri": "127.0.0.1:7687",
            "status": "running",
            "resourceInformation": {},
            "activeLockCount": 0,
            "elapsedTimeMillis": 2_418,
            "cpuTimeMillis": 2_301,
            "waitTimeMillis": 0,
            "idleTimeMillis": 117,
            "allocatedBytes": 1_048_576,
            "pageHits": 8_812,
            "pageFaults": 3,
        }),
        json!({
            "queryId": "query-12",
            "username": "neo4j",
            "metaData": { "app": "reporting" },
            "query": "CALL dbms.listQueries",
            "parameters": {},
            "planner": "idp",
            "runtime": "procedure",
            "indexes": [],
            "startTime": "2018-10-18T11:04:20.102Z",
            "protocol": "http",
            "clientAddress": "127.0.0.1:46718",
            "requestUri": "127.0.0.1:7474",
            "status": "running",
            "resourceInformation": {},
            "activeLockCount": 0,
            "elapsedTimeMillis": 0,
            "cpuTimeMillis": null,
            "waitTimeMillis": 0,
            "idleTimeMillis": null,
            "allocatedBytes": null,
            "pageHits": 0,
            "pageFaults": 0,
        }),
    ]
}

fn sample_transactions() -> Vec<Value> {
    vec![
        json!({
            "transactionId": "transaction-96",
            "username": "neo4j",
            "metaData": {},
            "startTime": "2018-10-18T11:04:17.938Z",
            "protocol": "bolt",
            "clientAddress": "127.0.0.1:41758",
            "requestUri": "127.0.0.1:7687",
            "currentQueryId": "query-11",
            "currentQuery": "MATCH (n:Person)-[:KNOWS*2..4]->(m) RETURN count(m)",
            "activeLockCount": 0,
            "status": "Running",
            "resourceInformation": {},
            "elapsedTimeMillis": 2_420,
            "cpuTimeMillis": 2_301,
            "waitTimeMillis": 0,
            "idleTimeMillis": 119,
            "allocatedBytes": 1_048_576,
            "allocatedDirectBytes": 0,
            "pageHits": 8_812,
            "pageFaults": 3,
        }),
        json!({
            "transactionId": "transaction-97",
            "username": "neo4j",
            "metaData": {},
            "startTime": "2018-10-18T11:04:19.001Z",
            "protocol": "http",
            "clientAddress": "127.0.0.1:46718",
            "requestUri": "127.0.0.1:7474",
            "currentQueryId": "",
            "currentQuery": "",
            "activeLockCount": 2,
            "status": "Running",
            "resourceInformation": {},
            "elapsedTimeMillis": 1_101,
            "cpuTimeMillis": 4,
            "waitTimeMillis": 0,
            "idleTimeMillis": 1_097,
            "allocatedBytes": 0,
            "allocatedDirectBytes": 0,
            "pageHits": 12,
            "pageFaults": 0,
        }),
    ]
}

fn enterprise(mode: &str) -> MockServer {
    let mut jmx = common_beans(mode);
    jmx.extend(enterprise_beans());
    MockServer {
        edition: "enterprise".to_string(),
        version: "3.5.3".to_string(),
        mode: mode.to_string(),
        jmx,
        queries: sample_queries(),
        transactions: Some(sample_transactions()),
        overview: Vec::new(),
        reachable: true,
        latency: std::time::Duration::ZERO,
        killed: Vec::new(),
        fail_next: None,
    }
}

impl MockServer {
    pub fn standalone_community() -> Self {
        MockServer {
            edition: "community".to_string(),
            version: "3.5.3".to_string(),
            mode: "SINGLE".to_string(),
            jmx: common_beans("SINGLE"),
            queries: Vec::new(),
            transactions: None,
            overview: Vec::new(),
            reachable: true,
            latency: std::time::Duration::ZERO,
            killed: Vec::new(),
            fail_next: None,
        }
    }

    pub fn standalone_enterprise() -> Self {
        enterprise("SINGLE")
    }

    /// An enterprise server older than `dbms.listTransactions`.
    pub fn legacy_enterprise() -> Self {
        let mut server = enterprise("SINGLE");
        server.version = "3.3.9".to_string();
        server.transactions = None;
        server
    }

    pub fn core_member() -> Self {
        enterprise("CORE")
    }

    pub fn read_replica() -> Self {
        enterprise("READ_REPLICA")
    }
}

/// Member addresses of a simulated causal cluster.
#[derive(Debug, Clone)]
pub struct ClusterLayout {
    pub leader: Address,
    pub followers: Vec<Address>,
    pub read_replicas: Vec<Address>,
}

impl ClusterLayout {
    /// Every member, leader first.
    pub fn members(&self) -> Vec<Address> {
        std::iter::once(self.leader.clone())
            .chain(self.followers.iter().cloned())
            .chain(self.read_replicas.iter().cloned())
            .collect()
    }
}

fn overview_row(id: usize, address: &Address, role: &str) -> Value {
    // Advertised like a real member: bolt first, then the HTTP endpoints.
    json!({
        "id": format!("{:08x}-0000-4000-8000-{:012x}", id, id),
        "addresses": [
            format!("bolt://{}:7687", address.host),
            format!("http://{}", address),
            format!("https://{}:7473", address.host),
        ],
        "role": role,
        "groups": [],
        "database": "default",
    })
}

impl MockConnector {
    /// A connector with one standalone community server at `address`.
    pub fn standalone_community(address: Address) -> Self {
        let connector = Self::new();
        connector.add_server(address, MockServer::standalone_community());
        connector
    }

    /// A connector with one standalone enterprise server at `address`.
    pub fn standalone_enterprise(address: Address) -> Self {
        let connector = Self::new();
        connector.add_server(address, MockServer::standalone_enterprise());
        connector
    }

    /// Three core members (one leader) and one read replica.
    pub fn causal_cluster() -> (Self, ClusterLayout) {
        let layout = ClusterLayout {
            leader: Address::new("core1", 7474),
            followers: vec![Address::new("core2", 7474), Address::new("core3", 7474)],
            read_replicas: vec![Address::new("replica1", 7474)],
        };
        let mut overview = vec![overview_row(1, &layout.leader, "LEADER")];
        for (i, address) in layout.followers.iter().enumerate() {
            overview.push(overview_row(i + 2, address, "FOLLOWER"));
        }
        for (i, address) in layout.read_replicas.iter().enumerate() {
            overview.push(overview_row(i + 10, address, "READ_REPLICA"));
        }

        let connector = Self::new();
        for address in std::iter::once(&layout.leader).chain(&layout.followers) {
            let mut server = MockServer::core_member();
            server.overview = overview.clone();
            connector.add_server(address.clone(), server);
        }
        for address in &layout.read_replicas {
            let mut server = MockServer::read_replica();
            server.overview = overview.clone();
            connector.add_server(address.clone(), server);
        }
        (connector, layout)
    }
}
