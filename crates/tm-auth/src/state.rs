use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info};

use crate::cache::TokenCache;
use crate::config::TokenmanConfig;
use crate::store::{OutputSink, output_name};

/// Everything a single invocation works with: credentials, network settings and
/// where results go
pub struct RunState {
    pub cache: TokenCache,
    config: TokenmanConfig,
    output: Arc<dyn OutputSink>,
}

impl RunState {
    pub fn new(cache: TokenCache, config: TokenmanConfig, output: Arc<dyn OutputSink>) -> Self {
        Self {
            cache,
            config,
            output,
        }
    }

    pub fn config(&self) -> &TokenmanConfig {
        &self.config
    }

    /// Write a result as `{prefix}.{utc}.json`.
    ///
    /// A failed write is logged and the JSON printed to stdout instead so the
    /// result is not lost; the returned location is `None` in that case.
    pub async fn write_output(&self, prefix: &str, data: &Value) -> Option<String> {
        let name = output_name(prefix, Utc::now());
        match self.output.write_json(&name, data).await {
            Ok(location) => {
                info!("\tOutput: {}", location);
                Some(location)
            }
            Err(e) => {
                error!("Failed to write JSON: {}", e);
                match serde_json::to_string_pretty(data) {
                    Ok(json) => println!("{json}"),
                    Err(e) => error!("Failed to render JSON: {}", e),
                }
                None
            }
        }
    }
}

impl std::fmt::Debug for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunState")
            .field("has_access_token", &self.cache.access_token().is_some())
            .field("has_refresh_token", &self.cache.refresh_token().is_some())
            .field("proxy", &self.config.proxy)
            .finish()
    }
}
