//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Endpoint sanitizing: trim, drop blanks, require absolute http(s) URLs,
//!   drop duplicates keeping the first occurrence
//! - Validate value ranges (page size, clear interval, body limit)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ModifierConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::ModifierConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("endpoint {0:?} is not an absolute URL")]
    InvalidEndpoint(String),

    #[error("endpoint {0:?} must use http or https")]
    UnsupportedScheme(String),

    #[error("site_url {0:?} is not an absolute URL")]
    InvalidSiteUrl(String),

    #[error("alternate_source_field must not be empty")]
    EmptyMarkerField,

    #[error("store.path must not be empty for the sqlite backend")]
    EmptyStorePath,

    #[error("store.logs_per_page must be at least 1")]
    ZeroPageSize,

    #[error("schedule.clear_interval_secs must be at least 1")]
    ZeroClearInterval,

    #[error("transport.max_body_bytes must be at least 1")]
    ZeroBodyLimit,
}

/// Sanitize a raw endpoint list as entered by an operator.
pub fn sanitize_endpoints<I, S>(raw: I) -> Result<Vec<String>, Vec<ValidationError>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut endpoints: Vec<String> = Vec::new();
    let mut errors = Vec::new();

    for entry in raw {
        let entry = entry.as_ref().trim();
        if entry.is_empty() {
            continue;
        }

        match Url::parse(entry) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
                if !endpoints.iter().any(|e| e == entry) {
                    endpoints.push(entry.to_string());
                }
            }
            Ok(_) => errors.push(ValidationError::UnsupportedScheme(entry.to_string())),
            Err(_) => errors.push(ValidationError::InvalidEndpoint(entry.to_string())),
        }
    }

    if errors.is_empty() {
        Ok(endpoints)
    } else {
        Err(errors)
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ModifierConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(mut endpoint_errors) = sanitize_endpoints(&config.interception.endpoints) {
        errors.append(&mut endpoint_errors);
    }

    let site_url = config.interception.site_url.trim();
    if !site_url.is_empty() && Url::parse(site_url).is_err() {
        errors.push(ValidationError::InvalidSiteUrl(site_url.to_string()));
    }

    if config.interception.alternate_source_field.trim().is_empty() {
        errors.push(ValidationError::EmptyMarkerField);
    }

    if config.store.backend == crate::config::schema::StoreBackend::Sqlite
        && config.store.path.trim().is_empty()
    {
        errors.push(ValidationError::EmptyStorePath);
    }

    if config.store.logs_per_page == 0 {
        errors.push(ValidationError::ZeroPageSize);
    }

    if config.schedule.clear_interval_secs == 0 {
        errors.push(ValidationError::ZeroClearInterval);
    }

    if config.transport.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
