use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub media: MediaConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Media library paths
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    /// Root of the media library. Every disk-mutating operation is contained
    /// under this path.
    pub root: PathBuf,
    /// Directory for runtime state (config exports, caches).
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// API authentication configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Optional API key required on every `/api/v1` request. When unset the
    /// API is open (trusted-network deployments).
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LogConfig {
    /// Filter directive, e.g. "info" or "sublarr_core=debug".
    #[serde(default)]
    pub level: Option<String>,
    /// Optional log file; stdout when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    5765
}

fn default_db_path() -> PathBuf {
    PathBuf::from("sublarr.db")
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("config")
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub media_root: String,
    pub server: ServerConfig,
    pub database_path: String,
    pub auth_enabled: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            media_root: config.media.root.display().to_string(),
            server: config.server.clone(),
            database_path: config.database.path.display().to_string(),
            auth_enabled: config.auth.api_key.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[media]
root = "/media"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.media.root, PathBuf::from("/media"));
        assert_eq!(config.server.port, 5765);
        assert_eq!(config.database.path, PathBuf::from("sublarr.db"));
        assert!(config.auth.api_key.is_none());
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[media]
root = "/media"
config_dir = "/var/lib/sublarr"

[server]
host = "127.0.0.1"
port = 9000

[database]
path = "/var/lib/sublarr/sublarr.db"

[auth]
api_key = "secret"

[log]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.auth.api_key.as_deref(), Some("secret"));
        assert_eq!(config.log.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_deserialize_missing_media_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitized_config_redacts_api_key() {
        let config = Config {
            media: MediaConfig {
                root: PathBuf::from("/media"),
                config_dir: PathBuf::from("config"),
            },
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig {
                api_key: Some("secret".to_string()),
            },
            log: LogConfig::default(),
        };
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.auth_enabled);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
    }
}
