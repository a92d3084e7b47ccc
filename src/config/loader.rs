//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::SignerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Why a configuration could not be accepted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {}", join_errors(.0))]
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
pub fn parse_config(content: &str) -> Result<SignerConfig, ConfigError> {
    let config: SignerConfig = toml::from_str(content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<SignerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let config = parse_config("[provider]\nexpiry_minutes = 5\n").unwrap();
        assert_eq!(config.provider.expiry_minutes, 5);
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("[provider\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_error_reported() {
        let err = parse_config("[provider]\nexpiry_minutes = 0\n").unwrap_err();
        assert!(err.to_string().contains("provider.expiry_minutes"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("definitely-missing-signer.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
