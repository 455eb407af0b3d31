//! In-memory mock driver for testing and demos.
//!
//! `MockConnector` simulates a set of endpoints that answer the procedure
//! calls a monitor issues, so the engine can be exercised without a running
//! server. Every connect, begin and statement counts as one network call.

mod scenarios;

pub use scenarios::{ClusterLayout, bean};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};

use super::{AccessMode, Connection, Connector, DriverError, Record, RoutingMode, Transaction};
use crate::config::{Address, Credentials};

const PROCEDURE_NOT_FOUND: &str = "Neo.ClientError.Procedure.ProcedureNotFound";
const TRANSACTION_NOT_FOUND: &str = "Neo.ClientError.Transaction.TransactionNotFound";

/// State of one simulated endpoint.
#[derive(Debug, Clone)]
pub struct MockServer {
    /// `"community"` or `"enterprise"`.
    pub edition: String,
    pub version: String,
    /// Value of the `dbms.mode` setting.
    pub mode: String,
    /// JMX beans as returned by `dbms.queryJmx`.
    pub jmx: Vec<Value>,
    /// Rows of `dbms.listQueries`.
    pub queries: Vec<Value>,
    /// Rows of `dbms.listTransactions`; `None` when the procedure is absent.
    pub transactions: Option<Vec<Value>>,
    /// Rows of `dbms.cluster.overview`.
    pub overview: Vec<Value>,
    pub reachable: bool,
    /// Added to every statement.
    pub latency: Duration,
    /// Query ids killed so far.
    pub killed: Vec<String>,
    /// Fails the next call of this procedure with this status code.
    pub fail_next: Option<(String, String)>,
}

impl MockServer {
    pub fn is_enterprise(&self) -> bool {
        self.edition == "enterprise"
    }

    pub fn is_cluster_member(&self) -> bool {
        self.mode == "CORE" || self.mode == "READ_REPLICA"
    }

    fn procedures(&self) -> Vec<&'static str> {
        let mut names = vec![
            "dbms.components",
            "dbms.listConfig",
            "dbms.procedures",
            "dbms.queryJmx",
        ];
        if self.is_enterprise() {
            names.extend(["dbms.killQuery", "dbms.listQueries"]);
            if self.transactions.is_some() {
                names.push("dbms.listTransactions");
            }
        }
        if self.is_cluster_member() {
            names.push("dbms.cluster.overview");
        }
        names
    }

    fn answer(&mut self, statement: &str, parameters: &Value) -> Result<Vec<Value>, DriverError> {
        let procedure = statement
            .trim()
            .strip_prefix("CALL ")
            .and_then(|s| s.split('(').next())
            .unwrap_or_default()
            .trim();

        if let Some((target, code)) = self.fail_next.take() {
            if target == procedure {
                return Err(DriverError::QueryFailed {
                    message: format!("injected failure in `{}`", procedure),
                    code,
                });
            }
            self.fail_next = Some((target, code));
        }

        if !self.procedures().contains(&procedure) {
            return Err(DriverError::QueryFailed {
                code: PROCEDURE_NOT_FOUND.to_string(),
                message: format!("There is no procedure with the name `{}`", procedure),
            });
        }

        match procedure {
            "dbms.queryJmx" => Ok(self.jmx.clone()),
            "dbms.components" => Ok(vec![json!({
                "name": "Neo4j Kernel",
                "versions": [self.version],
                "edition": self.edition,
            })]),
            "dbms.listConfig" => Ok(vec![json!({ "value": self.mode })]),
            "dbms.procedures" => Ok(self
                .procedures()
                .into_iter()
                .map(|name| json!({ "name": name }))
                .collect()),
            "dbms.listQueries" => Ok(self.queries.clone()),
            "dbms.listTransactions" => Ok(self.transactions.clone().unwrap_or_default()),
            "dbms.cluster.overview" => Ok(self.overview.clone()),
            "dbms.killQuery" => {
                let id = parameters
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let before = self.queries.len();
                self.queries
                    .retain(|q| q.get("queryId").and_then(Value::as_str) != Some(id.as_str()));
                let message = if self.queries.len() < before {
                    self.killed.push(id.clone());
                    "Query found"
                } else {
                    "No Query found with this id"
                };
                Ok(vec![json!({ "queryId": id, "message": message })])
            }
            _ => Err(DriverError::QueryFailed {
                code: "Neo.ClientError.Statement.SyntaxError".to_string(),
                message: format!("unsupported statement: {}", statement),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    servers: HashMap<Address, MockServer>,
    network_calls: HashMap<Address, usize>,
    connects: HashMap<Address, usize>,
    statements: HashMap<Address, Vec<String>>,
}

impl MockState {
    fn touch(&mut self, address: &Address) -> Result<Duration, DriverError> {
        *self.network_calls.entry(address.clone()).or_default() += 1;
        match self.servers.get(address) {
            Some(server) if server.reachable => Ok(server.latency),
            _ => Err(DriverError::Unreachable(format!(
                "connection refused: {}",
                address
            ))),
        }
    }
}

/// Connector over a shared set of simulated endpoints.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// registry owns another.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Creates a connector without endpoints; every connect fails.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_server(&self, address: Address, server: MockServer) {
        self.lock().servers.insert(address, server);
    }

    /// Applies `f` to the endpoint at `address`, if any.
    pub fn update<R>(&self, address: &Address, f: impl FnOnce(&mut MockServer) -> R) -> Option<R> {
        self.lock().servers.get_mut(address).map(f)
    }

    pub fn server(&self, address: &Address) -> Option<MockServer> {
        self.lock().servers.get(address).cloned()
    }

    pub fn set_reachable(&self, address: &Address, reachable: bool) {
        self.update(address, |s| s.reachable = reachable);
    }

    pub fn set_latency(&self, address: &Address, latency: Duration) {
        self.update(address, |s| s.latency = latency);
    }

    /// Makes the next call of `procedure` on `address` fail with `code`.
    pub fn fail_next(&self, address: &Address, procedure: &str, code: &str) {
        self.update(address, |s| {
            s.fail_next = Some((procedure.to_string(), code.to_string()))
        });
    }

    /// Connects, transaction starts and statements issued against `address`.
    pub fn network_calls(&self, address: &Address) -> usize {
        self.lock()
            .network_calls
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_network_calls(&self) -> usize {
        self.lock().network_calls.values().sum()
    }

    pub fn connects(&self, address: &Address) -> usize {
        self.lock().connects.get(address).copied().unwrap_or(0)
    }

    /// Statements run against `address`, oldest first.
    pub fn statements(&self, address: &Address) -> Vec<String> {
        self.lock()
            .statements
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    pub fn killed(&self, address: &Address) -> Vec<String> {
        self.server(address).map(|s| s.killed).unwrap_or_default()
    }

    fn run(
        &self,
        address: &Address,
        statement: &str,
        parameters: &Value,
    ) -> Result<Vec<Record>, DriverError> {
        let latency = {
            let mut state = self.lock();
            let latency = state.touch(address)?;
            state
                .statements
                .entry(address.clone())
                .or_default()
                .push(statement.to_string());
            latency
        };
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        let mut state = self.lock();
        let server = state
            .servers
            .get_mut(address)
            .filter(|s| s.reachable)
            .ok_or_else(|| DriverError::Unreachable(format!("connection reset: {}", address)))?;
        let rows = server.answer(statement, parameters)?;
        Ok(rows
            .into_iter()
            .map(|row| match row {
                Value::Object(map) => map,
                other => {
                    let mut map = Record::new();
                    map.insert("value".to_string(), other);
                    map
                }
            })
            .collect())
    }
}

impl Connector for MockConnector {
    fn scheme(&self) -> &str {
        "http"
    }

    fn connect(
        &self,
        address: &Address,
        _mode: RoutingMode,
        _credentials: &Credentials,
    ) -> Result<Box<dyn Connection>, DriverError> {
        {
            let mut state = self.lock();
            *state.connects.entry(address.clone()).or_default() += 1;
            state.touch(address)?;
        }
        Ok(Box::new(MockConnection {
            connector: self.clone(),
            address: address.clone(),
        }))
    }
}

struct MockConnection {
    connector: MockConnector,
    address: Address,
}

impl Connection for MockConnection {
    fn begin(&mut self, _mode: AccessMode) -> Result<Box<dyn Transaction + '_>, DriverError> {
        self.connector.lock().touch(&self.address)?;
        Ok(Box::new(MockTransaction {
            connection: self,
            failed: false,
        }))
    }
}

/// Like a real server, a failed statement rolls the transaction back and
/// every later call on it fails.
struct MockTransaction<'a> {
    connection: &'a MockConnection,
    failed: bool,
}

impl MockTransaction<'_> {
    fn check_open(&self) -> Result<(), DriverError> {
        if self.failed {
            return Err(DriverError::QueryFailed {
                code: TRANSACTION_NOT_FOUND.to_string(),
                message: "transaction was rolled back after an earlier error".to_string(),
            });
        }
        Ok(())
    }
}

impl Transaction for MockTransaction<'_> {
    fn run(&mut self, statement: &str, parameters: Value) -> Result<Vec<Record>, DriverError> {
        self.check_open()?;
        let result = self
            .connection
            .connector
            .run(&self.connection.address, statement, &parameters);
        if matches!(result, Err(DriverError::QueryFailed { .. })) {
            self.failed = true;
        }
        result
    }

    fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.check_open()
    }

    fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.check_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_one(connector: &MockConnector, address: &Address, statement: &str) -> Result<Vec<Record>, DriverError> {
        let mut conn = connector.connect(address, RoutingMode::Direct, &Credentials::new("neo4j", ""))?;
        let mut tx = conn.begin(AccessMode::Read)?;
        let rows = tx.run(statement, Value::Null)?;
        tx.commit()?;
        Ok(rows)
    }

    #[test]
    fn unknown_address_is_unreachable() {
        let connector = MockConnector::new();
        let address = Address::new("nowhere", 7474);
        let result = connector.connect(&address, RoutingMode::Direct, &Credentials::new("u", "p"));
        assert!(matches!(result, Err(DriverError::Unreachable(_))));
        assert_eq!(connector.network_calls(&address), 1);
    }

    #[test]
    fn community_edition_lacks_query_listing() {
        let address = Address::new("ce", 7474);
        let connector = MockConnector::new();
        connector.add_server(address.clone(), MockServer::standalone_community());

        let err = run_one(&connector, &address, "CALL dbms.listQueries()").unwrap_err();
        assert!(err.is_procedure_not_found());
        let rows = run_one(&connector, &address, "CALL dbms.components()").unwrap();
        assert_eq!(rows[0]["edition"], json!("community"));
    }

    #[test]
    fn counts_every_network_interaction() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::new();
        connector.add_server(address.clone(), MockServer::standalone_enterprise());

        run_one(&connector, &address, "CALL dbms.listConfig('dbms.mode') YIELD value").unwrap();
        // connect + begin + run
        assert_eq!(connector.network_calls(&address), 3);
        assert_eq!(connector.connects(&address), 1);
        assert_eq!(
            connector.statements(&address),
            vec!["CALL dbms.listConfig('dbms.mode') YIELD value".to_string()]
        );
    }

    #[test]
    fn kill_query_removes_it_from_the_listing() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::new();
        connector.add_server(address.clone(), MockServer::standalone_enterprise());
        let before = connector.server(&address).unwrap().queries.len();

        let mut conn = connector
            .connect(&address, RoutingMode::Direct, &Credentials::new("neo4j", ""))
            .unwrap();
        let mut tx = conn.begin(AccessMode::Write).unwrap();
        tx.run("CALL dbms.killQuery($id)", json!({"id": "query-11"}))
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(connector.killed(&address), vec!["query-11".to_string()]);
        assert_eq!(connector.server(&address).unwrap().queries.len(), before - 1);
    }

    #[test]
    fn failed_statement_aborts_the_transaction() {
        let address = Address::new("ce", 7474);
        let connector = MockConnector::standalone_community(address.clone());
        let mut conn = connector
            .connect(&address, RoutingMode::Direct, &Credentials::new("neo4j", ""))
            .unwrap();

        let mut tx = conn.begin(AccessMode::Read).unwrap();
        assert!(tx.run("CALL dbms.listQueries()", Value::Null).unwrap_err().is_procedure_not_found());
        let err = tx.run("CALL dbms.components()", Value::Null).unwrap_err();
        assert!(matches!(&err, DriverError::QueryFailed { code, .. } if code == TRANSACTION_NOT_FOUND));
        assert!(tx.commit().is_err());

        // A fresh transaction on the same connection works.
        let mut tx = conn.begin(AccessMode::Read).unwrap();
        assert!(tx.run("CALL dbms.components()", Value::Null).is_ok());
        tx.commit().unwrap();
    }

    #[test]
    fn fail_next_hits_only_the_named_procedure_once() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::standalone_enterprise(address.clone());
        connector.fail_next(&address, "dbms.queryJmx", "Neo.ClientError.Transaction.TransactionMarkedAsFailed");

        assert!(run_one(&connector, &address, "CALL dbms.components()").is_ok());
        let err = run_one(&connector, &address, "CALL dbms.queryJmx('*:*')").unwrap_err();
        assert_eq!(
            err,
            DriverError::QueryFailed {
                code: "Neo.ClientError.Transaction.TransactionMarkedAsFailed".to_string(),
                message: "injected failure in `dbms.queryJmx`".to_string(),
            }
        );
        assert!(run_one(&connector, &address, "CALL dbms.queryJmx('*:*')").is_ok());
    }

    #[test]
    fn unreachable_server_fails_mid_transaction() {
        let address = Address::new("ee", 7474);
        let connector = MockConnector::new();
        connector.add_server(address.clone(), MockServer::standalone_enterprise());

        let mut conn = connector
            .connect(&address, RoutingMode::Direct, &Credentials::new("neo4j", ""))
            .unwrap();
        let mut tx = conn.begin(AccessMode::Read).unwrap();
        connector.set_reachable(&address, false);
        let err = tx.run("CALL dbms.components()", Value::Null).unwrap_err();
        assert!(matches!(err, DriverError::Unreachable(_)));
    }
}
