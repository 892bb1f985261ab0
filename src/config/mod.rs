//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, endpoint sanitizing)
//!     → ModifierConfig (validated, immutable)
//!     → shared via SharedConfig to the interceptor and transport layer
//!
//! On file change:
//!     watcher.rs (ConfigReloader) sees an event for the file
//!     → loader.rs parses and validates
//!     → unchanged or invalid: current config kept
//!     → otherwise atomic swap inside SharedConfig
//!     → next intercepted request observes new config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes replace it wholesale
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

use std::sync::Arc;

use arc_swap::ArcSwap;

pub use loader::{load_config, load_or_default, parse_config, save_config, ConfigError};
pub use schema::{
    InterceptionConfig, ModifierConfig, NormalizationConfig, ObservabilityConfig, ScheduleConfig,
    StoreBackend, StoreConfig, TransportConfig,
};
pub use validation::{sanitize_endpoints, validate_config, ValidationError};

/// Hot-swappable configuration shared by every hook invocation.
#[derive(Clone, Debug)]
pub struct SharedConfig {
    inner: Arc<ArcSwap<ModifierConfig>>,
}

impl SharedConfig {
    pub fn new(config: ModifierConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Snapshot of the current configuration.
    pub fn load(&self) -> Arc<ModifierConfig> {
        self.inner.load_full()
    }

    /// Swap in a new configuration; in-flight calls keep their snapshot.
    pub fn replace(&self, config: ModifierConfig) {
        self.inner.store(Arc::new(config));
    }
}

impl From<ModifierConfig> for SharedConfig {
    fn from(config: ModifierConfig) -> Self {
        Self::new(config)
    }
}
