//! Request categories and URL normalization.
//!
//! # Responsibilities
//! - Classify an update-check URL as core, plugins or themes
//! - Reduce a URL to scheme, host, path and the query parameters its
//!   category cares about
//!
//! # Design Decisions
//! - One classifier and one normalizer, shared by the egress and the
//!   response path; the normalized URL is the correlation key
//! - Pure functions: same input, same output, and normalizing twice is a no-op
//! - Surviving parameters keep their original order
//! - The `?` is omitted when no parameter survives

use std::fmt;

use serde::Serialize;
use url::{form_urlencoded, Url};

use crate::config::NormalizationConfig;

/// Query parameters kept on core version checks.
pub const CORE_PARAMS: [&str; 7] = [
    "version",
    "php",
    "locale",
    "mysql",
    "local_package",
    "multisite_enabled",
    "initial_db_version",
];

/// Query parameters kept on plugin update checks.
pub const PLUGIN_PARAMS: [&str; 2] = ["plugins", "active"];

/// Query parameters kept on theme update checks.
pub const THEME_PARAMS: [&str; 1] = ["themes"];

/// Kind of update check a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Core,
    Plugins,
    Themes,
}

impl Category {
    /// Classify a request by the path of its URL; anything unrecognized is core.
    pub fn classify(url: &str) -> Self {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
        };

        if path.contains("plugins/update-check/") {
            Category::Plugins
        } else if path.contains("themes/update-check/") {
            Category::Themes
        } else {
            // "core/version-check/" and everything else
            Category::Core
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Core => "core",
            Category::Plugins => "plugins",
            Category::Themes => "themes",
        }
    }

    /// Body field carrying this category's item set, if any.
    pub fn body_field(&self) -> Option<&'static str> {
        match self {
            Category::Core => None,
            Category::Plugins => Some("plugins"),
            Category::Themes => Some("themes"),
        }
    }

    /// Query parameter names kept by [`normalize`].
    pub fn allowed_params<'a>(&self, config: &'a NormalizationConfig) -> Vec<&'a str> {
        match self {
            Category::Core => {
                let mut params: Vec<&'a str> = CORE_PARAMS.to_vec();
                params.extend(config.core_extra_params.iter().map(String::as_str));
                params
            }
            Category::Plugins => PLUGIN_PARAMS.to_vec(),
            Category::Themes => THEME_PARAMS.to_vec(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rebuild `url` as `scheme://host[:port]/path?filtered_query`.
///
/// A URL that does not parse is returned unchanged.
pub fn normalize(url: &str, category: Category, config: &NormalizationConfig) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };

    let allowed = category.allowed_params(config);
    let mut query = form_urlencoded::Serializer::new(String::new());
    let mut kept = 0usize;
    for (name, value) in parsed.query_pairs() {
        if allowed.contains(&name.as_ref()) {
            query.append_pair(&name, &value);
            kept += 1;
        }
    }

    let mut normalized = format!("{}://{}", parsed.scheme(), parsed.host_str().unwrap_or_default());
    if let Some(port) = parsed.port() {
        normalized.push_str(&format!(":{port}"));
    }
    normalized.push_str(parsed.path());
    if kept > 0 {
        normalized.push('?');
        normalized.push_str(&query.finish());
    }
    normalized
}

/// Category and normalized URL of a request, derived identically on egress
/// and on response arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationKey {
    pub category: Category,
    pub url: String,
}

impl CorrelationKey {
    pub fn derive(url: &str, config: &NormalizationConfig) -> Self {
        let category = Category::classify(url);
        Self {
            category,
            url: normalize(url, category, config),
        }
    }
}
