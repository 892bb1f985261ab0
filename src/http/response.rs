//! Response outcome as seen by the audit log.
//!
//! # Responsibilities
//! - Reduce a completed call to a status code, a transport error code, or unknown
//! - Map transport errors to stable error code strings
//!
//! # Design Decisions
//! - Timeouts are just another error code (`timeout`)
//! - Connection failures are `connect_error`, everything else `http_request_failed`

use std::error::Error;
use std::fmt;

/// Error code recorded when the transport gave up waiting.
pub const ERROR_TIMEOUT: &str = "timeout";
/// Error code recorded when no connection could be established.
pub const ERROR_CONNECT: &str = "connect_error";
/// Error code recorded for any other transport failure.
pub const ERROR_REQUEST_FAILED: &str = "http_request_failed";

/// What happened to an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// A response arrived with this HTTP status.
    Status(u16),
    /// The transport failed with this error code.
    Error(String),
    /// The host reported completion without a status.
    Unknown,
}

impl ResponseOutcome {
    /// Build an outcome from a transport error.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        ResponseOutcome::Error(classify_error(err).to_string())
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ResponseOutcome::Status(code) if (200..300).contains(code) => "success",
            ResponseOutcome::Status(_) => "http_error",
            ResponseOutcome::Error(_) => "transport_error",
            ResponseOutcome::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ResponseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseOutcome::Status(code) => write!(f, "{code}"),
            ResponseOutcome::Error(code) => f.write_str(code),
            ResponseOutcome::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Map a transport error (and its source chain) to an error code.
pub fn classify_error(err: &(dyn Error + 'static)) -> &'static str {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<tokio::time::error::Elapsed>() {
            return ERROR_TIMEOUT;
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return ERROR_TIMEOUT;
            }
        }
        if let Some(client) = e.downcast_ref::<hyper_util::client::legacy::Error>() {
            if client.is_connect() {
                return ERROR_CONNECT;
            }
        }
        current = e.source();
    }
    ERROR_REQUEST_FAILED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Wrapper(std::io::Error);

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "wrapped: {}", self.0)
        }
    }

    impl Error for Wrapper {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_display_matches_stored_status() {
        assert_eq!(ResponseOutcome::Status(200).to_string(), "200");
        assert_eq!(ResponseOutcome::Error("timeout".into()).to_string(), "timeout");
        assert_eq!(ResponseOutcome::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn test_classify_walks_source_chain() {
        let err = Wrapper(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert_eq!(classify_error(&err), ERROR_TIMEOUT);

        let err = Wrapper(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert_eq!(classify_error(&err), ERROR_REQUEST_FAILED);
    }

    #[tokio::test]
    async fn test_elapsed_is_timeout() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert_eq!(ResponseOutcome::from_error(&elapsed), ResponseOutcome::Error("timeout".into()));
    }

    #[test]
    fn test_labels() {
        assert_eq!(ResponseOutcome::Status(204).label(), "success");
        assert_eq!(ResponseOutcome::Status(503).label(), "http_error");
        assert_eq!(ResponseOutcome::Error("x".into()).label(), "transport_error");
    }
}
