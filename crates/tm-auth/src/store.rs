use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::{Result, TokenmanError};

/// Destination for command results
#[async_trait::async_trait]
pub trait OutputSink: Send + Sync {
    /// Persist `data` under `name`, returning where it was written
    async fn write_json(&self, name: &str, data: &Value) -> Result<String>;
}

/// `{prefix}.{yyyymmddHHMMSS}.json`, stamped with the given UTC time
pub fn output_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}.{}.json", prefix, at.format("%Y%m%d%H%M%S"))
}

/// In-memory sink for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    outputs: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.outputs.read().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.outputs
            .read()
            .ok()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl OutputSink for MemorySink {
    async fn write_json(&self, name: &str, data: &Value) -> Result<String> {
        self.outputs
            .write()
            .map_err(|_| TokenmanError::Io(std::io::Error::other("memory sink lock poisoned")))?
            .insert(name.to_string(), data.clone());
        Ok(name.to_string())
    }
}
