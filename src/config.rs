//! Connection targets, credentials and sampling configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default port of the HTTP transactional endpoint.
pub const DEFAULT_PORT: u16 = 7474;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(1);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_TRANSACTION_PATH: &str = "/db/data/transaction";

/// Network address of one endpoint, always `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host`, `host:port` or `:port`, filling gaps with
    /// `localhost` and `default_port`.
    pub fn parse_with_default(s: &str, default_port: u16) -> Result<Self, String> {
        let s = s.trim();
        let s = s.split_once("://").map(|(_, rest)| rest).unwrap_or(s);
        let s = s.trim_end_matches('/');
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = if port.is_empty() {
                    default_port
                } else {
                    port.parse::<u16>()
                        .map_err(|e| format!("invalid port '{}': {}", port, e))?
                };
                (host, port)
            }
            None => (s, default_port),
        };
        let host = if host.is_empty() { DEFAULT_HOST } else { host };
        Ok(Self::new(host, port))
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default(s, DEFAULT_PORT)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// User name and password passed through to the driver.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What a view asks the registry for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub address: Address,
    /// Use cluster-aware routing when the endpoint turns out to be a core member.
    pub prefer_routing: bool,
}

impl Target {
    pub fn direct(address: Address) -> Self {
        Self {
            address,
            prefer_routing: false,
        }
    }

    pub fn routing(address: Address) -> Self {
        Self {
            address,
            prefer_routing: true,
        }
    }
}

/// Sampling configuration shared by every monitor of a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Pause between two sampling cycles.
    pub refresh_period: Duration,
    /// Connect and request timeout handed to the driver.
    pub connect_timeout: Duration,
    /// Port assumed when an address omits it.
    pub default_port: u16,
    /// Path of the HTTP transactional endpoint.
    pub transaction_path: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_period: DEFAULT_REFRESH_PERIOD,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            default_port: DEFAULT_PORT,
            transaction_path: DEFAULT_TRANSACTION_PATH.to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn with_refresh_period(mut self, period: Duration) -> Self {
        self.refresh_period = period;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn with_transaction_path(mut self, path: impl Into<String>) -> Self {
        self.transaction_path = path.into();
        self
    }
}
