//! Abstractions over the database driver.
//!
//! The monitoring engine only needs three things from a driver: run a read
//! query and get rows back, run a write statement, and learn that the
//! endpoint is unreachable. The `Connector` trait lets the engine work with
//! the real HTTP endpoint or with an in-memory mock for tests and demos.

mod http;
pub mod mock;

pub use http::HttpConnector;

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{Address, Credentials};

/// One result row: column name to value.
pub type Record = Map<String, Value>;

/// Error class reported by a driver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    /// Connection refused, dropped or timed out.
    #[error("{0}")]
    Unreachable(String),
    /// The server rejected a statement.
    #[error("{code}: {message}")]
    QueryFailed { code: String, message: String },
}

impl DriverError {
    /// Older servers lack some procedures; that is a missing feature, not a failure.
    pub fn is_procedure_not_found(&self) -> bool {
        matches!(self, DriverError::QueryFailed { code, .. } if code.ends_with("ProcedureNotFound"))
    }
}

/// How connections to an endpoint are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoutingMode {
    /// Talk to the addressed server only.
    Direct,
    /// Cluster-aware routing through the addressed core member.
    Routing,
}

impl fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingMode::Direct => write!(f, "direct"),
            RoutingMode::Routing => write!(f, "routing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Opens connections to endpoints.
pub trait Connector: Send + Sync {
    /// URI scheme of the addresses this connector talks to (e.g. `http`).
    ///
    /// Cluster members advertise several addresses; the one with this scheme
    /// is the one monitors should connect to.
    fn scheme(&self) -> &str;

    /// Establishes a connection, failing with `DriverError::Unreachable`.
    fn connect(
        &self,
        address: &Address,
        mode: RoutingMode,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>, DriverError>;
}

/// An established connection to one endpoint.
pub trait Connection: Send {
    fn begin(&mut self, mode: AccessMode) -> Result<Box<dyn Transaction + '_>, DriverError>;

    /// Releases server-side resources. Dropping without closing is allowed.
    fn close(&mut self) {}
}

/// An open explicit transaction.
pub trait Transaction {
    /// Runs one statement. `parameters` is a JSON object or `Value::Null`.
    fn run(&mut self, statement: &str, parameters: Value) -> Result<Vec<Record>, DriverError>;

    fn commit(self: Box<Self>) -> Result<(), DriverError>;

    fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}
