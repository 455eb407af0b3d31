//! Driver backed by the server's HTTP transactional endpoint.
//!
//! Each explicit transaction is opened with a POST on the transaction path,
//! statements are posted to the transaction URL returned in `Location`, and
//! the transaction ends with a POST on its commit URL or a DELETE.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::LOCATION;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{AccessMode, Connection, Connector, DriverError, Record, RoutingMode, Transaction};
use crate::config::{Address, Credentials, MonitorConfig};

#[derive(Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    parameters: Value,
    #[serde(rename = "resultDataContents")]
    result_data_contents: [&'static str; 1],
}

#[derive(Serialize)]
struct TransactionRequest<'a> {
    statements: Vec<StatementRequest<'a>>,
}

#[derive(Deserialize, Default)]
struct TransactionResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<ServerError>,
    commit: Option<String>,
}

#[derive(Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    data: Vec<DataRow>,
}

#[derive(Deserialize)]
struct DataRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct ServerError {
    code: String,
    message: String,
}

/// Opens connections to `http://host:port<transaction_path>`.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    timeout: Duration,
    transaction_path: String,
}

impl HttpConnector {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            timeout: config.connect_timeout,
            transaction_path: config.transaction_path.clone(),
        }
    }
}

impl Connector for HttpConnector {
    fn scheme(&self) -> &str {
        "http"
    }

    fn connect(
        &self,
        address: &Address,
        mode: RoutingMode,
        credentials: &Credentials,
    ) -> Result<Box<dyn Connection>, DriverError> {
        // The HTTP endpoint has no routing layer; routed monitors talk to the
        // addressed core member directly.
        debug!(address = %address, mode = %mode, "opening http connection");
        let client = Client::builder()
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .build()
            .map_err(|e| DriverError::Unreachable(e.to_string()))?;
        let connection = HttpConnection {
            client,
            base_url: format!("http://{}{}", address, self.transaction_path),
            credentials: credentials.clone(),
        };
        // An empty auto-commit request checks reachability and credentials.
        connection.post(&format!("{}/commit", connection.base_url), Vec::new())?;
        Ok(Box::new(connection))
    }
}

struct HttpConnection {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpConnection {
    fn post(
        &self,
        url: &str,
        statements: Vec<StatementRequest<'_>>,
    ) -> Result<(TransactionResponse, Option<String>), DriverError> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .json(&TransactionRequest { statements })
            .send()
            .map_err(request_error)?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = decode(response)?;
        Ok((body, location))
    }

    fn delete(&self, url: &str) -> Result<(), DriverError> {
        let response = self
            .client
            .delete(url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .send()
            .map_err(request_error)?;
        decode(response).map(|_| ())
    }
}

impl Connection for HttpConnection {
    fn begin(&mut self, _mode: AccessMode) -> Result<Box<dyn Transaction + '_>, DriverError> {
        let (body, location) = self.post(&self.base_url, Vec::new())?;
        let commit_url = body.commit.ok_or_else(|| DriverError::QueryFailed {
            code: "Http.MissingCommitUrl".to_string(),
            message: "server did not return a commit URL".to_string(),
        })?;
        let url = location.unwrap_or_else(|| {
            commit_url
                .strip_suffix("/commit")
                .unwrap_or(&commit_url)
                .to_string()
        });
        Ok(Box::new(HttpTransaction {
            connection: self,
            url,
            commit_url,
        }))
    }
}

struct HttpTransaction<'a> {
    connection: &'a HttpConnection,
    url: String,
    commit_url: String,
}

impl Transaction for HttpTransaction<'_> {
    fn run(&mut self, statement: &str, parameters: Value) -> Result<Vec<Record>, DriverError> {
        let request = StatementRequest {
            statement,
            parameters,
            result_data_contents: ["row"],
        };
        let (body, _) = self.connection.post(&self.url, vec![request])?;
        Ok(body
            .results
            .into_iter()
            .next()
            .map(into_records)
            .unwrap_or_default())
    }

    fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.connection.post(&self.commit_url, Vec::new()).map(|_| ())
    }

    fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.connection.delete(&self.url)
    }
}

fn into_records(result: StatementResult) -> Vec<Record> {
    let StatementResult { columns, data } = result;
    data.into_iter()
        .map(|d| columns.iter().cloned().zip(d.row).collect())
        .collect()
}

fn request_error(e: reqwest::Error) -> DriverError {
    DriverError::Unreachable(format_http_error(&e))
}

fn decode(response: Response) -> Result<TransactionResponse, DriverError> {
    let status = response.status();
    let body: TransactionResponse = match response.json() {
        Ok(body) => body,
        Err(_) if status.is_success() => TransactionResponse::default(),
        Err(e) => {
            return Err(DriverError::QueryFailed {
                code: format!("Http.{}", status.as_u16()),
                message: format_http_error(&e),
            });
        }
    };
    if let Some(error) = body.errors.first() {
        return Err(DriverError::QueryFailed {
            code: error.code.clone(),
            message: error.message.clone(),
        });
    }
    if status == StatusCode::UNAUTHORIZED || !status.is_success() {
        return Err(DriverError::QueryFailed {
            code: format!("Http.{}", status.as_u16()),
            message: status.to_string(),
        });
    }
    Ok(body)
}

/// Formats reqwest errors for display.
fn format_http_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timed out".to_string()
    } else if e.is_connect() {
        "connection refused".to_string()
    } else {
        e.to_string()
    }
}
