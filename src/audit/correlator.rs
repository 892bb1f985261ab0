//! Creation and finalization of log rows.

use std::sync::Arc;

use chrono::Utc;

use crate::audit::AuditError;
use crate::config::{ModifierConfig, NormalizationConfig};
use crate::http::request::OutgoingRequest;
use crate::http::response::ResponseOutcome;
use crate::routing::{match_endpoint, CorrelationKey};
use crate::store::{LogId, LogStore, NewLogEntry, ResponseStatus};

/// Attempts at finalizing the latest pending row before giving up.
const FINALIZE_ATTEMPTS: usize = 3;

/// Result of correlating a response with a logged request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// The URL matches no monitored endpoint.
    Unmonitored,
    /// Row `id` moved to `status`.
    Finalized { id: LogId, status: ResponseStatus },
    /// No pending row exists for the normalized URL.
    NoPendingEntry { url: String, status: ResponseStatus },
}

#[derive(Debug, Clone)]
pub struct Correlator {
    store: Arc<dyn LogStore>,
}

impl Correlator {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Insert a `Pending` row for an outgoing (already rewritten) request.
    pub fn record_request(
        &self,
        request: &OutgoingRequest,
        normalization: &NormalizationConfig,
    ) -> Result<LogId, AuditError> {
        let key = CorrelationKey::derive(&request.url, normalization);
        let entry = NewLogEntry {
            time: Utc::now(),
            url: key.url,
            user_agent: sanitize_user_agent(request.user_agent().unwrap_or_default()),
            request_headers: request.headers_json(),
            request_body: request.body.to_log_json(),
        };
        Ok(self.store.insert(entry)?)
    }

    /// Finalize the most recent pending row for `url` with `outcome`.
    pub fn record_response(
        &self,
        outcome: &ResponseOutcome,
        url: &str,
        config: &ModifierConfig,
    ) -> Result<Correlation, AuditError> {
        if match_endpoint(url, &config.interception.endpoints).is_none() {
            return Ok(Correlation::Unmonitored);
        }

        let key = CorrelationKey::derive(url, &config.normalization);
        let status = ResponseStatus::from(outcome);

        for _ in 0..FINALIZE_ATTEMPTS {
            let Some(row) = self.store.latest_pending(&key.url)? else {
                return Ok(Correlation::NoPendingEntry { url: key.url, status });
            };
            if self.store.finalize(row.id, &status)? {
                return Ok(Correlation::Finalized { id: row.id, status });
            }
            // another response finalized this row first; look again
        }

        Err(AuditError::Contended(key.url))
    }

    /// Finalize a known row. Returns false if it was no longer pending.
    pub fn finalize(&self, id: LogId, outcome: &ResponseOutcome) -> Result<bool, AuditError> {
        Ok(self.store.finalize(id, &ResponseStatus::from(outcome))?)
    }
}

/// Strip control characters, collapse whitespace runs, trim.
fn sanitize_user_agent(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::RequestBody;
    use crate::store::MemoryLogStore;
    use axum::http::Method;

    fn config() -> ModifierConfig {
        let mut config = ModifierConfig::default();
        config.interception.endpoints = vec!["https://api.example.org/plugins/update-check/".into()];
        config
    }

    fn request(url: &str) -> OutgoingRequest {
        OutgoingRequest::new(Method::POST, url)
            .with_header("user-agent", "WordPress/6.5;  wordpress.org ")
            .with_body(RequestBody::form([("plugins", "{}")]))
    }

    #[test]
    fn test_record_then_finalize_by_url() {
        let store = Arc::new(MemoryLogStore::new());
        let correlator = Correlator::new(store.clone());
        let config = config();

        let url = "https://api.example.org/plugins/update-check/?active=%5B%5D&locale=de";
        let id = correlator.record_request(&request(url), &config.normalization).unwrap();

        let row = store.get(id).unwrap().unwrap();
        assert_eq!(row.url, "https://api.example.org/plugins/update-check/?active=%5B%5D");
        assert_eq!(row.user_agent, "WordPress/6.5; wordpress.org");
        assert!(row.response_code.is_pending());

        let result = correlator
            .record_response(&ResponseOutcome::Status(200), url, &config)
            .unwrap();
        assert_eq!(
            result,
            Correlation::Finalized {
                id,
                status: ResponseStatus::Code(200)
            }
        );

        // a second response has nothing left to finalize
        let result = correlator
            .record_response(&ResponseOutcome::Status(500), url, &config)
            .unwrap();
        assert!(matches!(result, Correlation::NoPendingEntry { .. }));
        assert_eq!(store.get(id).unwrap().unwrap().response_code, ResponseStatus::Code(200));
    }

    #[test]
    fn test_latest_pending_wins() {
        let store = Arc::new(MemoryLogStore::new());
        let correlator = Correlator::new(store.clone());
        let config = config();
        let url = "https://api.example.org/plugins/update-check/";

        let older = correlator.record_request(&request(url), &config.normalization).unwrap();
        let newer = correlator.record_request(&request(url), &config.normalization).unwrap();

        let result = correlator
            .record_response(&ResponseOutcome::Error("timeout".into()), url, &config)
            .unwrap();
        assert!(matches!(result, Correlation::Finalized { id, .. } if id == newer));
        assert!(store.get(older).unwrap().unwrap().response_code.is_pending());
    }

    #[test]
    fn test_unmonitored_response_is_ignored() {
        let store = Arc::new(MemoryLogStore::new());
        let correlator = Correlator::new(store.clone());
        let result = correlator
            .record_response(&ResponseOutcome::Status(200), "https://other.example/", &config())
            .unwrap();
        assert_eq!(result, Correlation::Unmonitored);
    }

    #[test]
    fn test_finalize_by_id_once() {
        let store = Arc::new(MemoryLogStore::new());
        let correlator = Correlator::new(store.clone());
        let id = correlator
            .record_request(&request("https://api.example.org/plugins/update-check/"), &Default::default())
            .unwrap();

        assert!(correlator.finalize(id, &ResponseOutcome::Unknown).unwrap());
        assert!(!correlator.finalize(id, &ResponseOutcome::Status(200)).unwrap());
        assert_eq!(store.get(id).unwrap().unwrap().response_code, ResponseStatus::Unknown);
    }

    #[test]
    fn test_sanitize_user_agent() {
        assert_eq!(sanitize_user_agent("  a\tb\u{7}c \n"), "a b c");
        assert_eq!(sanitize_user_agent(""), "");
    }
}
