//! Algorithm property bags.
//!
//! Properties arrive from TOML tables such as
//! `props = { sharding-count = 4, sharding-ranges = "10, 20" }`. Values may be
//! strings, integers, booleans or arrays; the typed getters accept the
//! obvious spellings of each.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Props(BTreeMap<String, Value>);

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used by tests and programmatic configuration.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// String view of a scalar property.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn require_str(&self, algorithm: &str, key: &str) -> Result<String, ConfigError> {
        match self.get_str(key) {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(invalid(algorithm, key, "required")),
        }
    }

    pub fn get_i64(&self, algorithm: &str, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| invalid(algorithm, key, "expected an integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| invalid(algorithm, key, "expected an integer")),
            Some(_) => Err(invalid(algorithm, key, "expected an integer")),
        }
    }

    pub fn require_i64(&self, algorithm: &str, key: &str) -> Result<i64, ConfigError> {
        self.get_i64(algorithm, key)?
            .ok_or_else(|| invalid(algorithm, key, "required"))
    }

    /// A strictly positive integer, e.g. `sharding-count`.
    pub fn require_positive(&self, algorithm: &str, key: &str) -> Result<u64, ConfigError> {
        let v = self.require_i64(algorithm, key)?;
        if v <= 0 {
            return Err(invalid(algorithm, key, "must be greater than zero"));
        }
        Ok(v as u64)
    }

    pub fn get_f64(&self, algorithm: &str, key: &str) -> Result<Option<f64>, ConfigError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| invalid(algorithm, key, "expected a number")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| invalid(algorithm, key, "expected a number")),
            Some(_) => Err(invalid(algorithm, key, "expected a number")),
        }
    }

    pub fn get_bool(&self, algorithm: &str, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(invalid(algorithm, key, "expected true or false")),
            },
            Some(_) => Err(invalid(algorithm, key, "expected true or false")),
        }
    }

    /// A list property: either an array or a comma-separated string.
    pub fn get_list(&self, algorithm: &str, key: &str) -> Result<Vec<String>, ConfigError> {
        match self.0.get(key) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s.trim().to_string()),
                    Value::Number(n) => Ok(n.to_string()),
                    _ => Err(invalid(algorithm, key, "list items must be scalars")),
                })
                .collect(),
            Some(_) => Err(invalid(algorithm, key, "expected a list")),
        }
    }
}

fn invalid(algorithm: &str, key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidProperty {
        algorithm: algorithm.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
