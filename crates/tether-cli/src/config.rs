//! TOML configuration for the tether binary.
//!
//! Precedence for the request timeout: CLI flag > `TETHER_TIMEOUT_MS` >
//! config file > default.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tether_mcp::McpServerConfig;
use tether_runs::SchedulerOptions;

fn default_history_cap() -> usize {
    100
}

fn default_tick_ms() -> u64 {
    1000
}

/// The config file: which server to run, and queue tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub server: McpServerConfig,
    #[serde(default)]
    pub queue: QueueSettings,
}

/// Queue tunables; the defaults match the scheduler's.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            history_cap: default_history_cap(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl QueueSettings {
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            history_cap: self.history_cap,
            tick: Duration::from_millis(self.tick_ms),
        }
    }
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ConfigFile = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Apply the timeout override chain on top of the file value.
    pub fn resolve_timeout(&mut self, cli_timeout_ms: Option<u64>) {
        let env_timeout = std::env::var("TETHER_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(timeout_ms) = cli_timeout_ms.or(env_timeout) {
            self.server.timeout_ms = timeout_ms;
        }
    }
}
