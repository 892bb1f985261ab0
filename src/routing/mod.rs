//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing request URL
//!     → matcher.rs (first monitored endpoint it falls under)
//!     → Return: matched endpoint or None (request passes untouched)
//!
//! Matched URL
//!     → normalize.rs (classify category, keep allowed query params)
//!     → CorrelationKey (category + normalized URL)
//! ```
//!
//! # Design Decisions
//! - Endpoints come from the live config snapshot on every call
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches the same endpoint
//! - First match wins (ordered by configuration)

pub mod matcher;
pub mod normalize;

pub use matcher::{match_endpoint, Endpoint};
pub use normalize::{normalize, Category, CorrelationKey};
