//! HTTP handling for outgoing update checks.
//!
//! # Data Flow
//! ```text
//! Request<Body> (from the host's client)
//!     → layer.rs (monitored? buffer body)
//!     → request.rs (decode into OutgoingRequest)
//!     → UpdateInterceptor::intercept (rewrite + log)
//!     → request.rs (re-encode, fix content-length and URI)
//!     → inner client (hyper_util legacy Client)
//!     → response.rs (status or error code)
//!     → UpdateInterceptor::finalize
//! ```

pub mod client;
pub mod layer;
pub mod request;
pub mod response;

pub use client::{build_client, InterceptingClient};
pub use layer::{UpdateCheckLayer, UpdateCheckService};
pub use request::{BodyEncoding, OutgoingRequest, RequestBody};
pub use response::ResponseOutcome;
