//! Typed access to `dbms.queryJmx` results and procedure rows.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::driver::Record;
use crate::error::MonitorError;

pub const OPERATING_SYSTEM: &str = "java.lang:type=OperatingSystem";
pub const RUNTIME: &str = "java.lang:type=Runtime";
pub const THREADING: &str = "java.lang:type=Threading";
pub const MEMORY: &str = "java.lang:type=Memory";
pub const CONFIGURATION: &str = "org.neo4j:instance=kernel#0,name=Configuration";
pub const KERNEL: &str = "org.neo4j:instance=kernel#0,name=Kernel";
pub const STORE_SIZES: &str = "org.neo4j:instance=kernel#0,name=Store sizes";
pub const PRIMITIVE_COUNT: &str = "org.neo4j:instance=kernel#0,name=Primitive count";
pub const TRANSACTIONS: &str = "org.neo4j:instance=kernel#0,name=Transactions";
pub const PAGE_CACHE: &str = "org.neo4j:instance=kernel#0,name=Page cache";

/// JMX beans by name, attributes unwrapped from their `{"value": ...}`
/// envelope.
#[derive(Debug, Default)]
pub struct JmxBeans {
    beans: HashMap<String, Map<String, Value>>,
}

impl JmxBeans {
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut beans = HashMap::with_capacity(records.len());
        for mut record in records {
            let Some(Value::String(name)) = record.remove("name") else {
                continue;
            };
            let attributes = match record.remove("attributes") {
                Some(Value::Object(map)) => map
                    .into_iter()
                    .map(|(k, v)| match v {
                        Value::Object(mut wrapped) if wrapped.contains_key("value") => {
                            (k, wrapped.remove("value").unwrap_or(Value::Null))
                        }
                        other => (k, other),
                    })
                    .collect(),
                _ => Map::new(),
            };
            beans.insert(name, attributes);
        }
        Self { beans }
    }

    pub fn len(&self) -> usize {
        self.beans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }

    pub fn get<'a>(&'a self, name: &'a str) -> Option<Fields<'a>> {
        self.beans.get(name).map(|map| Fields::new(name, map))
    }

    /// Like `get`, failing with `MissingMetric` for an absent bean.
    pub fn require<'a>(&'a self, name: &'a str) -> Result<Fields<'a>, MonitorError> {
        self.get(name).ok_or_else(|| MonitorError::missing_bean(name))
    }
}

fn as_u64(v: &Value) -> Option<u64> {
    v.as_u64()
        .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

fn as_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

/// Named map of values with accessors that report `MissingMetric` against
/// `source` when a required key is absent, null or of the wrong type.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    source: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub fn new(source: &'a str, map: &'a Map<String, Value>) -> Self {
        Self { source, map }
    }

    fn missing(&self, key: &str) -> MonitorError {
        MonitorError::missing_key(self.source, key)
    }

    pub fn opt(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub fn value(&self, key: &str) -> Result<&'a Value, MonitorError> {
        self.opt(key).ok_or_else(|| self.missing(key))
    }

    pub fn u64(&self, key: &str) -> Result<u64, MonitorError> {
        self.value(key).and_then(|v| as_u64(v).ok_or_else(|| self.missing(key)))
    }

    /// Like `u64`, but a value beyond `u32::MAX` is also missing.
    pub fn u32(&self, key: &str) -> Result<u32, MonitorError> {
        self.u64(key)
            .and_then(|v| u32::try_from(v).map_err(|_| self.missing(key)))
    }

    pub fn opt_u64(&self, key: &str) -> Option<u64> {
        self.opt(key).and_then(as_u64)
    }

    pub fn i64(&self, key: &str) -> Result<i64, MonitorError> {
        self.value(key).and_then(|v| as_i64(v).ok_or_else(|| self.missing(key)))
    }

    pub fn opt_i64(&self, key: &str) -> Option<i64> {
        self.opt(key).and_then(as_i64)
    }

    pub fn f64(&self, key: &str) -> Result<f64, MonitorError> {
        self.value(key)
            .and_then(|v| v.as_f64().ok_or_else(|| self.missing(key)))
    }

    pub fn opt_f64(&self, key: &str) -> Option<f64> {
        self.opt(key).and_then(Value::as_f64)
    }

    pub fn bool(&self, key: &str) -> Result<bool, MonitorError> {
        self.value(key)
            .and_then(|v| v.as_bool().ok_or_else(|| self.missing(key)))
    }

    pub fn string(&self, key: &str) -> Result<String, MonitorError> {
        self.value(key).and_then(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| self.missing(key))
        })
    }

    /// String value, empty when absent or null.
    pub fn text(&self, key: &str) -> String {
        self.opt_text(key).unwrap_or_default()
    }

    /// Non-empty string value.
    pub fn opt_text(&self, key: &str) -> Option<String> {
        self.opt(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Arbitrary JSON value, `Null` when absent.
    pub fn json(&self, key: &str) -> Value {
        self.opt(key).cloned().unwrap_or(Value::Null)
    }

    pub fn strings(&self, key: &str) -> Vec<String> {
        self.opt(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Open-data composite such as `HeapMemoryUsage`; its items live under
    /// `properties`.
    pub fn composite(&self, key: &str) -> Result<Fields<'a>, MonitorError> {
        let value = self.value(key)?;
        let map = value
            .get("properties")
            .unwrap_or(value)
            .as_object()
            .ok_or_else(|| self.missing(key))?;
        Ok(Fields::new(self.source, map))
    }
}
