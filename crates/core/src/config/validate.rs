use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Media root is an absolute path
/// - Server port is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if !config.media.root.is_absolute() {
        return Err(ConfigError::ValidationError(format!(
            "media.root must be absolute, got {:?}",
            config.media.root
        )));
    }

    if let Some(ref key) = config.auth.api_key {
        if key.len() < 8 {
            return Err(ConfigError::ValidationError(
                "auth.api_key must be at least 8 characters".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    #[test]
    fn test_validate_valid_config() {
        let config = load_config_from_str("[media]\nroot = \"/media\"\n").unwrap();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_relative_media_root_fails() {
        let config = load_config_from_str("[media]\nroot = \"media\"\n").unwrap();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config =
            load_config_from_str("[media]\nroot = \"/media\"\n[server]\nport = 0\n").unwrap();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_short_api_key_fails() {
        let config =
            load_config_from_str("[media]\nroot = \"/media\"\n[auth]\napi_key = \"abc\"\n")
                .unwrap();
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
