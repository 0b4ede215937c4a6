//! Configuration file handling for mqlink.

use std::path::Path;

use serde::Deserialize;

/// Defaults read from a TOML file. Command-line flags take precedence.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Broker connection defaults.
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub client_id: Option<String>,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Keep-alive interval in seconds, zero disables it
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u16,

    /// "3.1.1" or "3.1"
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: None,
            username: None,
            password: None,
            keep_alive: default_keep_alive(),
            protocol_version: default_protocol_version(),
            tls: TlsConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// CA certificate file (PEM format)
    pub ca_path: Option<String>,

    #[serde(default)]
    pub insecure: bool,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    mqlink_client::DEFAULT_PORT
}

fn default_keep_alive() -> u16 {
    mqlink_client::DEFAULT_KEEP_ALIVE
}

fn default_protocol_version() -> String {
    "3.1.1".to_string()
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 1883);
        assert_eq!(config.connection.keep_alive, 60);
        assert_eq!(config.logging.level, "warn");
        assert!(!config.connection.tls.enabled);
    }

    #[test]
    fn test_partial_tables() {
        let config: Config = toml::from_str(
            r#"
            [connection]
            host = "broker.example.com"
            client_id = "sensor-7"

            [connection.tls]
            enabled = true
            ca_path = "/etc/ssl/ca.pem"

            [logging]
            level = "info"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.host, "broker.example.com");
        assert_eq!(config.connection.port, 1883);
        assert_eq!(config.connection.client_id.as_deref(), Some("sensor-7"));
        assert!(config.connection.tls.enabled);
        assert_eq!(
            config.connection.tls.ca_path.as_deref(),
            Some("/etc/ssl/ca.pem")
        );
        assert_eq!(config.logging.level, "info");
    }
}
