//! Structured interception events.
//!
//! Every decision the interceptor takes is reported as one [`InterceptEvent`]
//! to an [`EventSink`]. The default sink turns events into tracing records and
//! metric increments; tests plug in a [`RecordingSink`] and assert on events.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::observability::metrics;
use crate::routing::Category;
use crate::store::{LogId, ResponseStatus};

/// What started a bulk clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearTrigger {
    Manual,
    Scheduled,
}

impl ClearTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClearTrigger::Manual => "manual",
            ClearTrigger::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InterceptEvent {
    Matched {
        url: String,
        endpoint: String,
        category: Category,
    },
    Unmatched {
        url: String,
    },
    UserAgentRewritten {
        from: String,
        to: String,
    },
    ItemRemoved {
        category: Category,
        id: String,
    },
    ActiveRemoved {
        id: String,
    },
    BodyFieldMissing {
        category: Category,
        field: String,
    },
    BodyParseFailed {
        category: Category,
        error: String,
    },
    RequestLogged {
        id: LogId,
        url: String,
    },
    ResponseCorrelated {
        id: LogId,
        status: ResponseStatus,
    },
    CorrelationMiss {
        url: String,
        status: ResponseStatus,
    },
    StoreFailure {
        operation: &'static str,
        error: String,
    },
    LogsCleared {
        trigger: ClearTrigger,
        removed: u64,
    },
}

/// Receiver of interception events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &InterceptEvent);
}

/// Default sink: tracing records plus metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &InterceptEvent) {
        match event {
            InterceptEvent::Matched { url, endpoint, category } => {
                tracing::debug!(url = %url, endpoint = %endpoint, category = %category, "Update check intercepted");
                metrics::record_intercepted(*category);
            }
            InterceptEvent::Unmatched { url } => {
                tracing::trace!(url = %url, "Request not monitored");
            }
            InterceptEvent::UserAgentRewritten { from, to } => {
                tracing::debug!(from = %from, to = %to, "User-agent rewritten");
            }
            InterceptEvent::ItemRemoved { category, id } => {
                tracing::info!(category = %category, id = %id, "Removed item with alternate update source");
                metrics::record_item_removed(*category);
            }
            InterceptEvent::ActiveRemoved { id } => {
                tracing::info!(id = %id, "Removed item from active list");
            }
            InterceptEvent::BodyFieldMissing { category, field } => {
                tracing::debug!(category = %category, field = %field, "Body field not present, body untouched");
            }
            InterceptEvent::BodyParseFailed { category, error } => {
                tracing::warn!(category = %category, error = %error, "Failed to parse body field, body untouched");
            }
            InterceptEvent::RequestLogged { id, url } => {
                tracing::info!(id = id, url = %url, "Request logged as pending");
            }
            InterceptEvent::ResponseCorrelated { id, status } => {
                tracing::info!(id = id, status = %status, "Response recorded");
                metrics::record_response(status);
            }
            InterceptEvent::CorrelationMiss { url, status } => {
                tracing::warn!(url = %url, status = %status, "No matching pending entry for response");
                metrics::record_correlation_miss();
            }
            InterceptEvent::StoreFailure { operation, error } => {
                tracing::error!(operation = operation, error = %error, "Log store failure");
                metrics::record_store_error(*operation);
            }
            InterceptEvent::LogsCleared { trigger, removed } => {
                tracing::info!(trigger = trigger.as_str(), removed = removed, "Request logs cleared");
                metrics::record_logs_cleared(*trigger);
            }
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<InterceptEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<InterceptEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &InterceptEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
