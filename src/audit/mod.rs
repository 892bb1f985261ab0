//! Request/response audit trail.
//!
//! # Data Flow
//! ```text
//! egress:   OutgoingRequest → Correlator::record_request → LogStore::insert (Pending)
//! response: outcome + URL   → Correlator::record_response
//!               → matcher (unmonitored ⇒ ignored)
//!               → CorrelationKey::derive (same code as egress)
//!               → LogStore::latest_pending → LogStore::finalize(id)
//! token:    outcome + LogId → Correlator::finalize → LogStore::finalize(id)
//! reads:    LogQueryService::query / clear_all
//! ```
//!
//! # Design Decisions
//! - The correlator is the only writer of log rows; the query service reads and clears
//! - Correlation by URL resolves the most recent pending row; this can pick the
//!   wrong row when identical requests are in flight at the same time

pub mod correlator;
pub mod query;

use thiserror::Error;

use crate::store::StoreError;

pub use correlator::{Correlation, Correlator};
pub use query::{LogPage, LogQuery, LogQueryService};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("log store failure: {0}")]
    Store(#[from] StoreError),

    #[error("pending row {0} changed concurrently too many times")]
    Contended(String),
}
