//! Hot reload of the configuration file.
//!
//! # Design Decisions
//! - The parent directory is watched, not the file, so editors that save by
//!   renaming a temp file over it are still picked up
//! - A reload parses and validates the whole file before swapping; a bad
//!   file leaves the running configuration in place
//! - Store and schedule settings are only read at startup; a reload that
//!   changes them is applied but warns that a restart is needed

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::parse_config;
use crate::config::SharedConfig;
use crate::observability::metrics;

/// Result of one reload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied { endpoints: usize, restart_needed: bool },
    Unchanged,
    Rejected(String),
}

impl ReloadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadOutcome::Applied { .. } => "applied",
            ReloadOutcome::Unchanged => "unchanged",
            ReloadOutcome::Rejected(_) => "rejected",
        }
    }
}

/// Reloads one configuration file into a [`SharedConfig`].
#[derive(Debug, Clone)]
pub struct ConfigReloader {
    path: PathBuf,
    shared: SharedConfig,
}

impl ConfigReloader {
    pub fn new(path: &Path, shared: SharedConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            shared,
        }
    }

    /// Read the file and swap it in if it is valid and differs.
    pub fn reload(&self) -> ReloadOutcome {
        let outcome = match fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|content| parse_config(&content).map_err(|e| e.to_string()))
        {
            Err(error) => {
                tracing::error!(path = %self.path.display(), error = %error, "Config reload rejected, keeping current configuration");
                ReloadOutcome::Rejected(error)
            }
            Ok(next) => {
                let current = self.shared.load();
                if *current == next {
                    ReloadOutcome::Unchanged
                } else {
                    let restart_needed = current.store != next.store || current.schedule != next.schedule;
                    if restart_needed {
                        tracing::warn!("Store or schedule settings changed; they take effect after a restart");
                    }
                    let endpoints = next.interception.endpoints.len();
                    tracing::info!(endpoints = endpoints, "Configuration reloaded");
                    self.shared.replace(next);
                    ReloadOutcome::Applied {
                        endpoints,
                        restart_needed,
                    }
                }
            }
        };
        metrics::record_config_reload(outcome.as_str());
        outcome
    }

    fn is_ours(&self, event: &Event) -> bool {
        let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
        relevant && event.paths.iter().any(|p| p.file_name() == self.path.file_name())
    }

    /// Watch the file; the returned watcher must be kept alive.
    pub fn watch(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let reloader = self.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if reloader.is_ours(&event) => {
                    reloader.reload();
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Watching configuration for changes");
        Ok(watcher)
    }
}
