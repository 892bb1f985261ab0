//! Host-facing hooks.
//!
//! # Responsibilities
//! - `on_request_egress`: match, rewrite and log an outgoing request
//! - `on_response_received`: correlate a completed call with its pending row
//! - `on_schedule_tick`: periodic bulk clear
//!
//! # Design Decisions
//! - Each hook reads one configuration snapshot and uses it throughout
//! - Rewriting and logging failures are reported as events; the request is
//!   always returned so the host can send it

use std::sync::Arc;

use crate::audit::{AuditError, Correlation, Correlator, LogQueryService};
use crate::config::SharedConfig;
use crate::http::request::OutgoingRequest;
use crate::http::response::ResponseOutcome;
use crate::observability::{ClearTrigger, EventSink, InterceptEvent, TracingSink};
use crate::rewrite::{BodyOutcome, PayloadRewriter, RewriteError, RewriteReport};
use crate::routing::match_endpoint;
use crate::store::{LogId, LogStore};

pub struct UpdateInterceptor {
    config: SharedConfig,
    correlator: Correlator,
    logs: LogQueryService,
    events: Arc<dyn EventSink>,
}

impl UpdateInterceptor {
    pub fn new(config: SharedConfig, store: Arc<dyn LogStore>) -> Self {
        Self {
            config,
            correlator: Correlator::new(store.clone()),
            logs: LogQueryService::new(store),
            events: Arc::new(TracingSink),
        }
    }

    /// Replace the default tracing sink.
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn logs(&self) -> &LogQueryService {
        &self.logs
    }

    /// The endpoint `url` falls under, if any.
    pub fn monitored_endpoint(&self, url: &str) -> Option<String> {
        let config = self.config.load();
        let endpoint = match_endpoint(url, &config.interception.endpoints).map(str::to_string);
        if endpoint.is_none() {
            self.events.emit(&InterceptEvent::Unmatched { url: url.to_string() });
        }
        endpoint
    }

    /// Filter hook run before every outgoing request.
    pub fn on_request_egress(&self, request: OutgoingRequest) -> OutgoingRequest {
        self.intercept(request).0
    }

    /// Like [`on_request_egress`](Self::on_request_egress), also returning the
    /// id of the row logged for the request.
    pub fn intercept(&self, mut request: OutgoingRequest) -> (OutgoingRequest, Option<LogId>) {
        let config = self.config.load();
        let Some(endpoint) = match_endpoint(&request.url, &config.interception.endpoints) else {
            self.events.emit(&InterceptEvent::Unmatched {
                url: request.url.clone(),
            });
            return (request, None);
        };
        let endpoint = endpoint.to_string();

        let report = PayloadRewriter::new(&config).rewrite(&mut request, &endpoint);
        self.emit_report(&report);

        let id = match self.correlator.record_request(&request, &config.normalization) {
            Ok(id) => {
                self.events.emit(&InterceptEvent::RequestLogged {
                    id,
                    url: report.normalized_url,
                });
                Some(id)
            }
            Err(e) => {
                self.store_failure("insert", &e);
                None
            }
        };

        (request, id)
    }

    /// Observer hook run after every outgoing request completes.
    pub fn on_response_received(&self, outcome: &ResponseOutcome, request_url: &str) -> Option<Correlation> {
        let config = self.config.load();
        match self.correlator.record_response(outcome, request_url, &config) {
            Ok(correlation) => {
                match &correlation {
                    Correlation::Unmonitored => {}
                    Correlation::Finalized { id, status } => {
                        self.events.emit(&InterceptEvent::ResponseCorrelated {
                            id: *id,
                            status: status.clone(),
                        });
                    }
                    Correlation::NoPendingEntry { url, status } => {
                        self.events.emit(&InterceptEvent::CorrelationMiss {
                            url: url.clone(),
                            status: status.clone(),
                        });
                    }
                }
                Some(correlation)
            }
            Err(e) => {
                self.store_failure("finalize", &e);
                None
            }
        }
    }

    /// Finalize the row logged for a request whose id is known.
    pub fn finalize(&self, id: LogId, outcome: &ResponseOutcome) -> bool {
        match self.correlator.finalize(id, outcome) {
            Ok(true) => {
                self.events.emit(&InterceptEvent::ResponseCorrelated {
                    id,
                    status: outcome.into(),
                });
                true
            }
            Ok(false) => {
                tracing::debug!(id = id, "Log row was no longer pending");
                false
            }
            Err(e) => {
                self.store_failure("finalize", &e);
                false
            }
        }
    }

    /// Scheduled clear; skipped when disabled in configuration.
    pub fn on_schedule_tick(&self) -> Option<u64> {
        if !self.config.load().schedule.clear_enabled {
            tracing::debug!("Scheduled clear disabled, skipping");
            return None;
        }
        match self.clear_logs(ClearTrigger::Scheduled) {
            Ok(removed) => Some(removed),
            Err(e) => {
                self.store_failure("truncate", &e);
                None
            }
        }
    }

    /// Delete every log row.
    pub fn clear_logs(&self, trigger: ClearTrigger) -> Result<u64, AuditError> {
        let removed = self.logs.clear_all()?;
        self.events.emit(&InterceptEvent::LogsCleared { trigger, removed });
        Ok(removed)
    }

    fn emit_report(&self, report: &RewriteReport) {
        self.events.emit(&InterceptEvent::Matched {
            url: report.original_url.clone(),
            endpoint: report.endpoint.clone(),
            category: report.category,
        });

        if let Some(change) = &report.user_agent {
            self.events.emit(&InterceptEvent::UserAgentRewritten {
                from: change.from.clone(),
                to: change.to.clone(),
            });
        }

        match &report.body {
            BodyOutcome::NotApplicable => {}
            BodyOutcome::Rewritten { removed, removed_active } => {
                for id in removed {
                    self.events.emit(&InterceptEvent::ItemRemoved {
                        category: report.category,
                        id: id.clone(),
                    });
                }
                for id in removed_active {
                    self.events.emit(&InterceptEvent::ActiveRemoved { id: id.clone() });
                }
            }
            BodyOutcome::Skipped(RewriteError::FieldMissing(field)) => {
                self.events.emit(&InterceptEvent::BodyFieldMissing {
                    category: report.category,
                    field: field.to_string(),
                });
            }
            BodyOutcome::Skipped(err) => {
                self.events.emit(&InterceptEvent::BodyParseFailed {
                    category: report.category,
                    error: err.to_string(),
                });
            }
        }
    }

    fn store_failure(&self, operation: &'static str, error: &AuditError) {
        self.events.emit(&InterceptEvent::StoreFailure {
            operation,
            error: error.to_string(),
        });
    }
}
