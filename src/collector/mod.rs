//! Snapshot assembly.
//!
//! One read transaction per cycle collects everything a `Snapshot` holds:
//! bulk JMX metrics, product identity and, depending on edition and mode,
//! running queries, transactions and cluster membership. A server aborts the
//! transaction on any failed statement, so a procedure found missing
//! mid-read is remembered and the read starts over without it.

mod jmx;
mod records;

pub use jmx::{Fields, JmxBeans};

use std::collections::HashSet;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Address;
use crate::driver::{AccessMode, Connection, DriverError, Record, Transaction};
use crate::error::MonitorError;
use crate::model::{
    ClusterOverview, DbmsMode, Edition, QueryId, Snapshot, SystemInfo, TransactionInfo,
    TransactionList,
};

pub const QUERY_JMX: &str = "CALL dbms.queryJmx('*:*')";
pub const COMPONENTS: &str = "CALL dbms.components()";
pub const LIST_QUERIES: &str = "CALL dbms.listQueries()";
pub const LIST_TRANSACTIONS: &str = "CALL dbms.listTransactions()";
pub const CLUSTER_OVERVIEW: &str = "CALL dbms.cluster.overview()";
pub const LIST_PROCEDURES: &str = "CALL dbms.procedures()";
pub const DBMS_MODE: &str = "CALL dbms.listConfig('dbms.mode') YIELD value";
pub const KILL_QUERY: &str = "CALL dbms.killQuery($id)";
pub const KILL_PROCEDURE: &str = "dbms.killQuery";

/// Procedures available on one connection.
///
/// Listed once per connection. When the listing itself fails the set is
/// unknown and every procedure is tried until the server reports it absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Procedures {
    names: Option<HashSet<String>>,
    absent: HashSet<String>,
}

impl Procedures {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Some(names.into_iter().map(Into::into).collect()),
            absent: HashSet::new(),
        }
    }

    pub fn list(connection: &mut dyn Connection) -> Self {
        match list_procedure_names(connection) {
            Ok(names) => {
                debug!(count = names.len(), "listed procedures");
                Self {
                    names: Some(names),
                    absent: HashSet::new(),
                }
            }
            Err(e) => {
                debug!(error = %e, "procedure listing unavailable");
                Self::unknown()
            }
        }
    }

    pub fn is_known(&self) -> bool {
        self.names.is_some()
    }

    pub fn supports(&self, name: &str) -> bool {
        !self.absent.contains(name) && self.names.as_ref().is_none_or(|names| names.contains(name))
    }

    /// Records that the server answered "procedure not found" for `name`.
    pub fn mark_absent(&mut self, name: &str) -> bool {
        self.absent.insert(name.to_string())
    }
}

fn list_procedure_names(connection: &mut dyn Connection) -> Result<HashSet<String>, DriverError> {
    let mut tx = connection.begin(AccessMode::Read)?;
    let rows = tx.run(LIST_PROCEDURES, Value::Null)?;
    tx.commit()?;
    Ok(rows
        .iter()
        .filter_map(|r| r.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// Reads the endpoint's `dbms.mode` setting.
pub fn probe_mode(connection: &mut dyn Connection) -> Result<DbmsMode, MonitorError> {
    let mut tx = connection.begin(AccessMode::Read)?;
    let rows = tx.run(DBMS_MODE, Value::Null)?;
    tx.commit()?;
    Ok(rows
        .first()
        .and_then(|r| r.get("value"))
        .and_then(Value::as_str)
        .map(DbmsMode::from_setting)
        .unwrap_or_default())
}

/// Kills one query in its own write transaction. Returns whether the
/// server accepted the kill; a rejection is logged, only a connectivity
/// failure is returned.
pub fn kill_query(connection: &mut dyn Connection, id: QueryId) -> Result<bool, MonitorError> {
    let mut tx = connection.begin(AccessMode::Write)?;
    let result = tx.run(KILL_QUERY, json!({ "id": id.to_string() }));
    let rejected = match result {
        Ok(_) => None,
        Err(DriverError::Unreachable(msg)) => return Err(MonitorError::Unreachable(msg)),
        Err(e) => Some(e),
    };
    if let Some(e) = rejected {
        warn!(query = %id, error = %e, "kill rejected");
        if let Err(DriverError::Unreachable(msg)) = tx.rollback() {
            return Err(MonitorError::Unreachable(msg));
        }
        return Ok(false);
    }
    match tx.commit() {
        Ok(()) => {
            debug!(query = %id, "kill sent");
            Ok(true)
        }
        Err(DriverError::Unreachable(msg)) => Err(MonitorError::Unreachable(msg)),
        Err(e) => {
            warn!(query = %id, error = %e, "kill not committed");
            Ok(false)
        }
    }
}

/// Runs `fetch_snapshot` in its own read transaction.
///
/// When a procedure turns out to be missing the transaction is rolled back
/// and the read is retried without it, so the snapshot still comes from a
/// single transaction.
pub fn read_snapshot(
    connection: &mut dyn Connection,
    address: &Address,
    procedures: &mut Procedures,
    sampled_at: i64,
) -> Result<Snapshot, MonitorError> {
    loop {
        let mut tx = connection.begin(AccessMode::Read)?;
        let result = fetch_snapshot(tx.as_mut(), address, procedures, sampled_at);
        let failure = match result {
            Ok(snapshot) => {
                tx.commit()?;
                return Ok(snapshot);
            }
            Err(failure) => failure,
        };
        if let Err(rollback) = tx.rollback() {
            debug!(error = %rollback, "rollback failed");
        }
        match failure {
            FetchError::Absent(procedure) => {
                debug!(procedure, "procedure not found, reading again");
                procedures.mark_absent(procedure);
            }
            FetchError::Failed(e) => return Err(e),
        }
    }
}

/// Why one read attempt stopped.
enum FetchError {
    /// The server does not have this procedure; the transaction is dead.
    Absent(&'static str),
    Failed(MonitorError),
}

impl From<MonitorError> for FetchError {
    fn from(err: MonitorError) -> Self {
        FetchError::Failed(err)
    }
}

impl From<DriverError> for FetchError {
    fn from(err: DriverError) -> Self {
        FetchError::Failed(err.into())
    }
}

/// Runs `statement` unless the procedure is known to be absent.
fn run_optional(
    tx: &mut dyn Transaction,
    procedures: &Procedures,
    procedure: &'static str,
    statement: &str,
) -> Result<Option<Vec<Record>>, FetchError> {
    if !procedures.supports(procedure) {
        return Ok(None);
    }
    match tx.run(statement, Value::Null) {
        Ok(rows) => Ok(Some(rows)),
        Err(e) if e.is_procedure_not_found() => Err(FetchError::Absent(procedure)),
        Err(e) => Err(e.into()),
    }
}

/// Assembles one snapshot. Either every required field is present or the
/// whole snapshot fails.
fn fetch_snapshot(
    tx: &mut dyn Transaction,
    address: &Address,
    procedures: &Procedures,
    sampled_at: i64,
) -> Result<Snapshot, FetchError> {
    let beans = JmxBeans::from_records(tx.run(QUERY_JMX, Value::Null)?);
    let components = tx.run(COMPONENTS, Value::Null)?;

    let os = beans.require(jmx::OPERATING_SYSTEM)?;
    let system = SystemInfo {
        os: records::os_info(&os)?,
        runtime: records::runtime_info(&beans.require(jmx::RUNTIME)?)?,
        threads: beans
            .get(jmx::THREADING)
            .map(|b| records::thread_info(&b))
            .transpose()?,
        dbms: records::dbms_info(&components, &beans)?,
    };
    let memory = records::memory_info(&os, &beans)?;
    let storage = records::storage_info(&os, &beans)?;

    let (mut queries, mut transactions, mut page_cache) = (None, None, None);
    if system.dbms.edition == Edition::Enterprise {
        queries = run_optional(tx, procedures, "dbms.listQueries", LIST_QUERIES)?
            .map(|rows| rows.iter().map(records::query_info).collect::<Result<Vec<_>, _>>())
            .transpose()?;

        let items = run_optional(tx, procedures, "dbms.listTransactions", LIST_TRANSACTIONS)?
            .map(|rows| {
                rows.iter()
                    .map(records::transaction_info)
                    .collect::<Result<Vec<TransactionInfo>, _>>()
            })
            .transpose()?;
        transactions = beans
            .get(jmx::TRANSACTIONS)
            .map(|b| records::transaction_counters(&b))
            .transpose()?
            .map(|counters| TransactionList { counters, items });

        page_cache = beans
            .get(jmx::PAGE_CACHE)
            .map(|b| records::page_cache_info(&b))
            .transpose()?;
    }

    let cluster = if system.dbms.mode.is_cluster_member() {
        run_optional(tx, procedures, "dbms.cluster.overview", CLUSTER_OVERVIEW)?
            .map(|rows| {
                rows.iter()
                    .map(records::cluster_member)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .map(|members| ClusterOverview { members })
    } else {
        None
    };

    debug!(
        address = %address,
        beans = beans.len(),
        queries = queries.as_ref().map_or(0, Vec::len),
        "snapshot assembled"
    );

    Ok(Snapshot {
        address: address.clone(),
        sampled_at,
        system,
        memory,
        storage,
        queries,
        transactions,
        page_cache,
        cluster,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::driver::mock::{MockConnector, MockServer};
    use crate::driver::{Connector, RoutingMode};
    use crate::model::{QueryId, Role, TransactionId};

    fn connect(connector: &MockConnector, address: &Address) -> Box<dyn Connection> {
        connector
            .connect(address, RoutingMode::Direct, &Credentials::new("neo4j", "secret"))
            .unwrap()
    }

    fn sample(connector: &MockConnector, address: &Address, procedures: &mut Procedures) -> Result<Snapshot, MonitorError> {
        let mut conn = connect(connector, address);
        read_snapshot(conn.as_mut(), address, procedures, 1_539_863_600_000)
    }

    #[test]
    fn enterprise_snapshot_is_fully_populated() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        let snapshot = sample(&connector, &address, &mut Procedures::unknown()).unwrap();

        assert_eq!(snapshot.system.dbms.product, "Neo4j");
        assert_eq!(snapshot.system.dbms.version, "3.5.3");
        assert!(snapshot.is_enterprise());
        assert!(!snapshot.is_cluster_member());
        assert_eq!(snapshot.dbms_uptime().as_secs(), 3600);
        assert_eq!(snapshot.memory.non_heap.max, None);
        assert_eq!(snapshot.storage.ids.relationship_types, 7);

        let queries = snapshot.queries.as_ref().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].id, QueryId(11));

        let transactions = snapshot.transactions.as_ref().unwrap();
        assert_eq!(transactions.counters.committed, 1312);
        let items = transactions.items.as_ref().unwrap();
        assert_eq!(items[0].id, TransactionId(96));
        assert_eq!(items[0].current_query_id, Some(QueryId(11)));
        assert_eq!(items[1].current_query_id, None);

        assert_eq!(snapshot.page_cache.as_ref().unwrap().pins, 71);
        assert_eq!(
            connector.statements(&address),
            vec![QUERY_JMX, COMPONENTS, LIST_QUERIES, LIST_TRANSACTIONS]
        );
    }

    #[test]
    fn community_snapshot_has_no_enterprise_fields() {
        let address = Address::new("ce", 7474);
        let connector = MockConnector::standalone_community(address.clone());
        let snapshot = sample(&connector, &address, &mut Procedures::unknown()).unwrap();

        assert_eq!(snapshot.system.dbms.edition, Edition::Community);
        assert!(snapshot.queries.is_none());
        assert!(snapshot.transactions.is_none());
        assert!(snapshot.page_cache.is_none());
        assert_eq!(connector.statements(&address), vec![QUERY_JMX, COMPONENTS]);
    }

    #[test]
    fn known_missing_procedure_is_not_called() {
        let address = Address::new("old", 7474);
        let connector = MockConnector::new();
        connector.add_server(address.clone(), MockServer::legacy_enterprise());

        let mut conn = connect(&connector, &address);
        let mut procedures = Procedures::list(conn.as_mut());
        assert!(procedures.is_known());
        assert!(!procedures.supports("dbms.listTransactions"));

        let snapshot = read_snapshot(conn.as_mut(), &address, &mut procedures, 0).unwrap();
        let transactions = snapshot.transactions.unwrap();
        assert_eq!(transactions.items, None);
        assert_eq!(transactions.counters.opened, 1321);
        assert!(
            !connector
                .statements(&address)
                .contains(&LIST_TRANSACTIONS.to_string())
        );
    }

    #[test]
    fn unknown_procedures_are_tried_and_absence_tolerated() {
        let address = Address::new("old", 7474);
        let connector = MockConnector::new();
        connector.add_server(address.clone(), MockServer::legacy_enterprise());
        let mut conn = connect(&connector, &address);
        let mut procedures = Procedures::unknown();

        let snapshot = read_snapshot(conn.as_mut(), &address, &mut procedures, 0).unwrap();
        assert_eq!(snapshot.transactions.unwrap().items, None);
        assert_eq!(snapshot.queries.map(|q| q.len()), Some(2));
        assert!(!procedures.supports("dbms.listTransactions"));
        // The aborted read is started over without the missing procedure.
        assert_eq!(
            connector.statements(&address),
            vec![
                QUERY_JMX,
                COMPONENTS,
                LIST_QUERIES,
                LIST_TRANSACTIONS,
                QUERY_JMX,
                COMPONENTS,
                LIST_QUERIES
            ]
        );

        // Learned for the rest of the connection.
        read_snapshot(conn.as_mut(), &address, &mut procedures, 0).unwrap();
        let statements = connector.statements(&address);
        assert_eq!(statements.len(), 10);
        assert_eq!(statements.iter().filter(|s| *s == LIST_TRANSACTIONS).count(), 1);
    }

    #[test]
    fn missing_procedure_does_not_cost_the_cluster_overview() {
        let (connector, layout) = MockConnector::causal_cluster();
        connector.update(&layout.leader, |s| s.transactions = None);

        let snapshot = sample(&connector, &layout.leader, &mut Procedures::unknown()).unwrap();
        assert_eq!(snapshot.transactions.unwrap().items, None);
        assert_eq!(snapshot.cluster.map(|c| c.members.len()), Some(4));
    }

    #[test]
    fn query_failure_aborts_the_read() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        connector.fail_next(&address, "dbms.listQueries", "Neo.ClientError.Transaction.TransactionMarkedAsFailed");

        let err = sample(&connector, &address, &mut Procedures::unknown()).unwrap_err();
        assert!(matches!(
            &err,
            MonitorError::TransientQueryFailure { code, .. }
                if code == "Neo.ClientError.Transaction.TransactionMarkedAsFailed"
        ));
        assert!(err.drops_connection());
    }

    #[test]
    fn cluster_member_reports_overview() {
        let (connector, layout) = MockConnector::causal_cluster();
        let snapshot = sample(&connector, &layout.leader, &mut Procedures::unknown()).unwrap();

        assert_eq!(snapshot.system.dbms.mode, DbmsMode::Core);
        let overview = snapshot.cluster.as_ref().unwrap();
        assert_eq!(overview.members.len(), 4);
        assert_eq!(overview.with_role(Role::Follower).count(), 2);
        assert_eq!(
            overview.leader().unwrap().address_for("http"),
            Some(layout.leader.clone())
        );
    }

    #[test]
    fn missing_required_bean_fails_the_whole_snapshot() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        connector.update(&address, |s| {
            s.jmx.retain(|b| b["name"] != json!(jmx::STORE_SIZES));
        });

        let err = sample(&connector, &address, &mut Procedures::unknown()).unwrap_err();
        assert_eq!(err, MonitorError::missing_bean(jmx::STORE_SIZES));
        assert!(!err.drops_connection());
    }

    #[test]
    fn kill_runs_in_its_own_write_transaction() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        let mut conn = connect(&connector, &address);

        assert!(kill_query(conn.as_mut(), QueryId(11)).unwrap());
        // The server answers "no query found" without failing.
        assert!(kill_query(conn.as_mut(), QueryId(999)).unwrap());
        assert_eq!(connector.killed(&address), vec!["query-11".to_string()]);
        // connect + 2 x (begin + run)
        assert_eq!(connector.network_calls(&address), 5);
    }

    #[test]
    fn rejected_kill_is_not_an_error() {
        let address = Address::new("ce", 7474);
        let connector = MockConnector::standalone_community(address.clone());
        let mut conn = connect(&connector, &address);

        assert!(!kill_query(conn.as_mut(), QueryId(1)).unwrap());
    }

    #[test]
    fn kill_on_lost_connection_is_an_error() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        let mut conn = connect(&connector, &address);
        connector.set_reachable(&address, false);

        assert!(matches!(
            kill_query(conn.as_mut(), QueryId(11)),
            Err(MonitorError::Unreachable(_))
        ));
    }

    #[test]
    fn probe_reads_dbms_mode() {
        let (connector, layout) = MockConnector::causal_cluster();
        let mut conn = connect(&connector, &layout.followers[0]);
        assert_eq!(probe_mode(conn.as_mut()).unwrap(), DbmsMode::Core);

        let mut conn = connect(&connector, &layout.read_replicas[0]);
        assert_eq!(probe_mode(conn.as_mut()).unwrap(), DbmsMode::ReadReplica);
    }
}
