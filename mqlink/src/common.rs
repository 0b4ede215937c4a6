//! Connection flags and logging setup shared by the subcommands.

use std::path::PathBuf;

use clap::Args;
use mqlink_client::ConnectOptions;
use mqlink_core::protocol::ProtocolVersion;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use crate::config::{Config, ConnectionConfig};

/// Common connection arguments shared between pub and sub.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// TOML file with connection and logging defaults
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// MQTT broker hostname
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// MQTT broker port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Client ID (auto-generated if not specified)
    #[arg(short = 'i', long)]
    pub client_id: Option<String>,

    /// Username for authentication
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Password for authentication
    #[arg(short = 'P', long)]
    pub password: Option<String>,

    /// Keep-alive interval in seconds
    #[arg(short = 'k', long)]
    pub keep_alive: Option<u16>,

    /// MQTT protocol version (311 or 31)
    #[arg(short = 'V', long)]
    pub protocol_version: Option<String>,

    /// Connect over TLS
    #[arg(long)]
    pub tls: bool,

    /// CA certificate file for TLS (PEM format)
    #[arg(long)]
    pub cafile: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Clear the broker-side session on connect
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub clean_session: bool,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl ConnectionArgs {
    pub fn load_config(&self) -> Result<Config, Box<dyn std::error::Error>> {
        match &self.config {
            Some(path) => Config::from_file(path),
            None => Ok(Config::default()),
        }
    }

    /// Merge the flags over the file defaults.
    pub fn to_connect_options(
        &self,
        config: &ConnectionConfig,
    ) -> Result<ConnectOptions, Box<dyn std::error::Error>> {
        let client_id = self
            .client_id
            .clone()
            .or_else(|| config.client_id.clone())
            .unwrap_or_else(generate_client_id);
        let host = self.host.clone().unwrap_or_else(|| config.host.clone());
        let port = self.port.unwrap_or(config.port);

        let version = self
            .protocol_version
            .as_deref()
            .unwrap_or(&config.protocol_version);

        let mut opts = ConnectOptions::new(client_id, host, port)
            .keep_alive(self.keep_alive.unwrap_or(config.keep_alive))
            .clean_session(self.clean_session)
            .protocol_version(parse_protocol_version(version)?)
            .tls(self.tls || config.tls.enabled)
            .danger_skip_tls_verify(self.insecure || config.tls.insecure);

        if let Some(ca) = self.cafile.as_ref().or(config.tls.ca_path.as_ref()) {
            opts = opts.ca_path(ca);
        }

        if let Some(user) = self.username.as_ref().or(config.username.as_ref()) {
            opts = opts.username(user);
        }

        if let Some(pass) = self.password.as_ref().or(config.password.as_ref()) {
            opts = opts.password(pass.as_bytes().to_vec());
        }

        Ok(opts)
    }
}

fn generate_client_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    // Fits the 23 character limit brokers must accept.
    format!("mqlink-{}", &id[..16])
}

pub fn parse_protocol_version(version: &str) -> Result<ProtocolVersion, String> {
    match version {
        "311" | "3.1.1" | "v311" => Ok(ProtocolVersion::V3_1_1),
        "31" | "3.1" | "v31" => Ok(ProtocolVersion::V3_1),
        other => Err(format!("unsupported protocol version: {}", other)),
    }
}

/// Initialize tracing. `-v` wins over the configured level.
pub fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        connection: ConnectionArgs,
    }

    #[test]
    fn test_flags_override_file() {
        let cli = TestCli::parse_from(["mqlink", "-H", "flag-host", "-i", "flag-id"]);
        let config = ConnectionConfig {
            host: "file-host".to_string(),
            port: 8883,
            ..Default::default()
        };

        let options = cli.connection.to_connect_options(&config).unwrap();

        assert_eq!(options.host(), "flag-host");
        assert_eq!(options.port(), 8883);
        assert_eq!(options.client_id(), "flag-id");
    }

    #[test]
    fn test_generated_client_id() {
        let cli = TestCli::parse_from(["mqlink"]);

        let options = cli
            .connection
            .to_connect_options(&ConnectionConfig::default())
            .unwrap();

        assert!(options.client_id().starts_with("mqlink-"));
        assert_eq!(options.client_id().len(), 23);
    }

    #[test]
    fn test_protocol_versions() {
        assert_eq!(parse_protocol_version("3.1.1"), Ok(ProtocolVersion::V3_1_1));
        assert_eq!(parse_protocol_version("31"), Ok(ProtocolVersion::V3_1));
        assert!(parse_protocol_version("5").is_err());
    }
}
