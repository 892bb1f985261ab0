//! Configuration loading from and saving to disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ModifierConfig;
use crate::config::validation::{sanitize_endpoints, validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
///
/// The endpoint list comes back sanitized (trimmed, blanks and duplicates
/// removed).
pub fn parse_config(content: &str) -> Result<ModifierConfig, ConfigError> {
    let mut config: ModifierConfig = toml::from_str(content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;
    config.interception.endpoints =
        sanitize_endpoints(&config.interception.endpoints).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ModifierConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load the file if it exists, otherwise start from defaults.
pub fn load_or_default(path: &Path) -> Result<ModifierConfig, ConfigError> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        Ok(ModifierConfig::default())
    }
}

/// Validate and write configuration as pretty TOML.
pub fn save_config(path: &Path, config: &ModifierConfig) -> Result<(), ConfigError> {
    validate_config(config).map_err(ConfigError::Validation)?;
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    tracing::info!(path = %path.display(), "Configuration saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sanitizes_endpoints() {
        let config = parse_config(
            r#"
            [interception]
            endpoints = [
                "https://api.wordpress.org/plugins/update-check/",
                "  https://api.wordpress.org/plugins/update-check/ ",
                "",
            ]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.interception.endpoints,
            vec!["https://api.wordpress.org/plugins/update-check/".to_string()]
        );
    }

    #[test]
    fn test_parse_rejects_invalid_endpoint() {
        let err = parse_config("[interception]\nendpoints = [\"nope\"]\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors, vec![ValidationError::InvalidEndpoint("nope".into())]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join("urm_test_save_then_load.toml");

        let mut config = ModifierConfig::default();
        config
            .interception
            .set_endpoints(["https://api.wordpress.org/themes/update-check/"])
            .unwrap();
        config.interception.site_url = "https://blog.example.com".into();
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("urm_test_definitely_missing.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config, ModifierConfig::default());
    }
}
