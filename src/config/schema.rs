//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the modifier.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::config::validation::{sanitize_endpoints, ValidationError};

/// Root configuration for the update request modifier.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ModifierConfig {
    /// Which requests are intercepted and how they are rewritten.
    pub interception: InterceptionConfig,

    /// Query parameter allow-lists used by URL normalization.
    pub normalization: NormalizationConfig,

    /// Log store backend.
    pub store: StoreConfig,

    /// Recurring log clearing.
    pub schedule: ScheduleConfig,

    /// Outbound transport limits.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Interception and rewrite settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct InterceptionConfig {
    /// Monitored endpoint prefixes, in match order.
    pub endpoints: Vec<String>,

    /// Base URL of the host application, replaced inside the user-agent.
    pub site_url: String,

    /// Replacement for `site_url` in the user-agent.
    pub user_agent_replacement: String,

    /// Item descriptor field naming an alternate update source.
    pub alternate_source_field: String,

    /// Send the normalized URL upstream instead of the original one.
    pub forward_normalized_url: bool,
}

impl Default for InterceptionConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            site_url: String::new(),
            user_agent_replacement: "wordpress.org".to_string(),
            alternate_source_field: "UpdateURI".to_string(),
            forward_normalized_url: true,
        }
    }
}

impl InterceptionConfig {
    /// Replace the endpoint list with a sanitized copy of `raw`.
    ///
    /// Nothing changes when any entry is rejected.
    pub fn set_endpoints<I, S>(&mut self, raw: I) -> Result<(), Vec<ValidationError>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.endpoints = sanitize_endpoints(raw)?;
        Ok(())
    }
}

/// Query parameter allow-lists.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Extra parameters kept on core version checks.
    pub core_extra_params: Vec<String>,
}

/// Log store backend selection.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

/// Log store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// SQLite database file (ignored by the memory backend).
    pub path: String,

    /// Default page size for log queries.
    pub logs_per_page: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: "update-request-logs.db".to_string(),
            logs_per_page: 10,
        }
    }
}

/// Scheduled log clearing.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub clear_enabled: bool,

    /// Seconds between two clears (daily by default).
    pub clear_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            clear_enabled: true,
            clear_interval_secs: 86_400,
        }
    }
}

/// Outbound transport limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Total time for request/response in seconds (0 disables).
    pub request_secs: u64,

    /// Largest request body buffered for rewriting.
    pub max_body_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,

    /// Address for the Prometheus scrape endpoint while `run` is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_listen: Option<SocketAddr>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            metrics_listen: None,
        }
    }
}
