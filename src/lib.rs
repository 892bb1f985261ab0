//! Outbound update-check request interception.
//!
//! Matches outgoing requests against monitored endpoints, strips items that
//! update from an alternate source, normalizes the URL, rewrites the
//! user-agent, and keeps an audit log of every intercepted call with its
//! eventual response status.

pub mod audit;
pub mod config;
pub mod http;
pub mod interceptor;
pub mod lifecycle;
pub mod observability;
pub mod rewrite;
pub mod routing;
pub mod store;

pub use config::{ModifierConfig, SharedConfig};
pub use http::{build_client, OutgoingRequest, ResponseOutcome, UpdateCheckLayer};
pub use interceptor::UpdateInterceptor;
pub use lifecycle::Shutdown;
pub use store::{open_store, LogStore};
