//! Endpoint matching logic.
//!
//! # Responsibilities
//! - Decide whether an outgoing URL falls under a monitored endpoint
//! - Report which endpoint matched
//!
//! # Design Decisions
//! - Trailing slashes are stripped from the endpoint before comparing
//! - Plain string prefix comparison, case-sensitive
//! - First match in configuration order wins

/// A configured endpoint prefix, compared without its trailing slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    configured: String,
    prefix: String,
}

impl Endpoint {
    pub fn new(configured: impl Into<String>) -> Self {
        let configured = configured.into();
        let prefix = configured.trim_end_matches(['/', '\\']).to_string();
        Self { configured, prefix }
    }

    /// The endpoint as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.configured
    }

    /// Returns true if `url` starts with this endpoint.
    pub fn matches(&self, url: &str) -> bool {
        !self.prefix.is_empty() && url.starts_with(&self.prefix)
    }
}

/// Return the first endpoint `url` falls under.
pub fn match_endpoint<'a, I, S>(url: &str, endpoints: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a S>,
    S: AsRef<str> + ?Sized + 'a,
{
    endpoints
        .into_iter()
        .map(AsRef::as_ref)
        .find(|endpoint| Endpoint::new(*endpoint).matches(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_is_optional() {
        let endpoint = Endpoint::new("https://api.wordpress.org/plugins/update-check/");

        assert!(endpoint.matches("https://api.wordpress.org/plugins/update-check/1.1/"));
        assert!(endpoint.matches("https://api.wordpress.org/plugins/update-check"));
        assert!(!endpoint.matches("https://api.wordpress.org/themes/update-check/1.1/"));
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        let endpoint = Endpoint::new("https://api.wordpress.org/Plugins/");
        assert!(!endpoint.matches("https://api.wordpress.org/plugins/update-check/"));
    }

    #[test]
    fn test_first_configured_match_wins() {
        let endpoints = vec![
            "https://api.wordpress.org/".to_string(),
            "https://api.wordpress.org/plugins/".to_string(),
        ];

        let hit = match_endpoint("https://api.wordpress.org/plugins/update-check/1.1/", &endpoints);
        assert_eq!(hit, Some("https://api.wordpress.org/"));

        let reversed: Vec<String> = endpoints.into_iter().rev().collect();
        let hit = match_endpoint("https://api.wordpress.org/plugins/update-check/1.1/", &reversed);
        assert_eq!(hit, Some("https://api.wordpress.org/plugins/"));
    }

    #[test]
    fn test_no_match() {
        let endpoints = ["https://api.wordpress.org/plugins/"];
        assert_eq!(match_endpoint("https://example.com/plugins/", endpoints.iter().copied()), None);
        let none: [&str; 0] = [];
        assert_eq!(match_endpoint("https://example.com/", none), None);
    }
}
