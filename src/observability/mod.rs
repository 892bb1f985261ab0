//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Interceptor decision points
//!     → events.rs (one InterceptEvent per decision)
//!     → EventSink
//!         → TracingSink: tracing records + metrics.rs counters
//!         → RecordingSink: kept in memory for assertions
//!
//! Binary startup:
//!     → logging.rs (EnvFilter + fmt/json subscriber)
//! ```
//!
//! # Design Decisions
//! - Rewriting and correlation code never logs directly; it reports
//! - Metrics go through the `metrics` facade; `run` can serve them with the
//!   Prometheus exporter

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{ClearTrigger, EventSink, InterceptEvent, RecordingSink, TracingSink};
pub use logging::init_logging;
