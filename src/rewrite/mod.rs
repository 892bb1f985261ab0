//! Payload rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! OutgoingRequest (matched endpoint)
//!     → Category::classify + normalize (URL written back when forwarding normalized)
//!     → user-agent: site URL replaced
//!     → plugins/themes body field
//!         → items.rs (parse UpdateItemSet, strip alternate sources, prune active)
//!         → written back as compact JSON
//!     → RewriteReport (one entry per decision, turned into events by the caller)
//! ```
//!
//! # Design Decisions
//! - Body problems are recoverable: the body stays untouched, headers are still rewritten
//! - The rewriter never logs; the report is the single source of diagnostics

pub mod items;
pub mod payload;

use thiserror::Error;

pub use items::{is_marker_set, FieldEncoding, UpdateItemSet};
pub use payload::{BodyOutcome, PayloadRewriter, RewriteReport, UserAgentChange};

/// Why a request body could not be rewritten.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("body field {0:?} is not set")]
    FieldMissing(&'static str),

    #[error("body field {field:?} is not valid JSON: {source}")]
    Json {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("body field {0:?} does not hold a JSON object")]
    NotAnObject(&'static str),
}
