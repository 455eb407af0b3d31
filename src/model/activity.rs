//! Running queries and transactions.
//!
//! Both listings are enterprise-only procedures; on community servers the
//! snapshot carries `None` instead.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Numeric part of a `query-N` id.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub u64);

/// Numeric part of a `transaction-N` id.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

fn parse_prefixed(s: &str, prefix: &str) -> Result<u64, String> {
    s.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .ok_or_else(|| format!("expected '{}-N', got '{}'", prefix, s))?
        .parse()
        .map_err(|e| format!("invalid id '{}': {}", s, e))
}

impl FromStr for QueryId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_prefixed(s, "query").map(QueryId)
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query-{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_prefixed(s, "transaction").map(TransactionId)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transaction-{}", self.0)
    }
}

/// One row of `dbms.listQueries()`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct QueryInfo {
    pub id: QueryId,
    pub user: String,
    pub client_address: String,
    pub request_uri: String,
    pub protocol: String,
    pub planner: String,
    pub runtime: String,
    /// `None` when allocation tracking is disabled.
    pub allocated_bytes: Option<u64>,
    pub active_lock_count: u64,
    pub page_hits: u64,
    pub page_faults: u64,
    pub elapsed_ms: u64,
    /// `None` when CPU time tracking is disabled.
    pub cpu_ms: Option<u64>,
    pub wait_ms: Option<u64>,
    pub idle_ms: Option<u64>,
    pub status: String,
    pub text: String,
    /// ISO-8601 as reported by the server.
    pub start_time: String,
    pub metadata: Value,
    pub parameters: Value,
}

/// Engine-wide transaction counters.
///
/// Source: `org.neo4j:instance=kernel#0,name=Transactions`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TransactionCounters {
    pub last_committed_id: u64,
    pub opened: u64,
    pub open: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub peak_concurrent: u64,
}

/// One row of `dbms.listTransactions()`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub user: String,
    pub client_address: String,
    pub request_uri: String,
    pub protocol: String,
    /// Query the transaction is running right now, if any.
    pub current_query_id: Option<QueryId>,
    pub current_query: Option<String>,
    pub active_lock_count: u64,
    pub status: String,
    pub elapsed_ms: u64,
    pub cpu_ms: Option<u64>,
    pub wait_ms: Option<u64>,
    pub idle_ms: Option<u64>,
    pub allocated_bytes: Option<u64>,
    pub allocated_direct_bytes: Option<u64>,
    pub page_hits: u64,
    pub page_faults: u64,
    pub start_time: String,
    pub metadata: Value,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct TransactionList {
    pub counters: TransactionCounters,
    /// `None` on servers without `dbms.listTransactions`.
    pub items: Option<Vec<TransactionInfo>>,
}

impl TransactionList {
    pub fn len(&self) -> usize {
        self.items.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
