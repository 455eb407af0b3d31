//! Error taxonomy of the monitoring engine.
//!
//! Nothing here is fatal to the process: a failed cycle degrades one
//! endpoint's snapshot to `None` and the sampling loop carries on.

use thiserror::Error;

use crate::driver::DriverError;

/// Error surfaced to subscribers through `Subscriber::on_error`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonitorError {
    /// Connection refused, dropped or timed out.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The server rejected a statement (e.g. a transaction marked as failed).
    #[error("query failed ({code}): {message}")]
    TransientQueryFailure { code: String, message: String },

    /// The server answered but did not expose a metric the snapshot requires.
    #[error("missing metric {bean}{}", key_suffix(.key))]
    MissingMetric { bean: String, key: Option<String> },

    /// The background sampling thread could not be started.
    #[error("failed to start sampling thread: {0}")]
    Spawn(String),

    /// Every highlight token is held by an open panel.
    #[error("no highlight left for a new panel")]
    HighlightsExhausted,
}

fn key_suffix(key: &Option<String>) -> String {
    key.as_deref().map(|k| format!(" / {k}")).unwrap_or_default()
}

impl MonitorError {
    pub fn missing_bean(bean: &str) -> Self {
        MonitorError::MissingMetric {
            bean: bean.to_string(),
            key: None,
        }
    }

    pub fn missing_key(bean: &str, key: &str) -> Self {
        MonitorError::MissingMetric {
            bean: bean.to_string(),
            key: Some(key.to_string()),
        }
    }

    /// Whether the connection must be discarded and re-established on the
    /// next cycle.
    pub fn drops_connection(&self) -> bool {
        matches!(
            self,
            MonitorError::Unreachable(_) | MonitorError::TransientQueryFailure { .. }
        )
    }
}

impl From<DriverError> for MonitorError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Unreachable(msg) => MonitorError::Unreachable(msg),
            DriverError::QueryFailed { code, message } => {
                MonitorError::TransientQueryFailure { code, message }
            }
        }
    }
}
