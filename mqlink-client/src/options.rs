use std::time::Duration;

use bytes::Bytes;
use mqlink_core::{
    message::Message, protocol::ProtocolVersion, qos::QoS, topic::validate_topic_name,
};
use mqlink_packets::connect::{ConnectFlags, ConnectPacket, ConnectPayload};

use crate::error::SessionError;

pub const DEFAULT_PORT: u16 = 1883;
pub const DEFAULT_KEEP_ALIVE: u16 = 60;

/// Longest string or binary field a CONNECT can carry behind its two-byte length.
const MAX_FIELD_LENGTH: usize = u16::MAX as usize;

/// TLS configuration for client connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Enable TLS for the connection.
    pub enabled: bool,
    /// Path to custom CA certificate file (PEM format).
    /// If not set, the webpki root certificates are used.
    pub ca_path: Option<String>,
    /// Skip server certificate verification (insecure, for testing only).
    pub danger_skip_verify: bool,
}

/// Options for connecting to an MQTT broker.
///
/// The client identifier is fixed at construction.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub(crate) client_id: String,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) keep_alive: u16,
    pub(crate) clean_session: bool,
    pub(crate) will: Option<Message>,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<Bytes>,
    pub(crate) protocol_version: ProtocolVersion,
    pub(crate) connect_timeout: Duration,
    pub(crate) ack_timeout: Option<Duration>,
    pub(crate) tls: TlsOptions,
}

impl ConnectOptions {
    /// Create new connection options for the given client, host and port.
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            client_id: client_id.into(),
            host: host.into(),
            port,
            keep_alive: DEFAULT_KEEP_ALIVE,
            clean_session: true,
            will: None,
            username: None,
            password: None,
            protocol_version: ProtocolVersion::V3_1_1,
            connect_timeout: Duration::from_secs(30),
            ack_timeout: None,
            tls: TlsOptions::default(),
        }
    }

    /// Set the keep-alive interval in seconds. Zero disables keep-alive.
    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    /// Set clean session flag. If true, the broker will discard any existing session.
    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    /// Set the will message to be published if the client disconnects unexpectedly.
    pub fn will(mut self, will: Message) -> Self {
        self.will = Some(will);
        self
    }

    /// Set the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password for authentication.
    pub fn password(mut self, password: impl Into<Bytes>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Time allowed between `connect()` and CONNACK.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Drop pending operations that stay unacknowledged for longer than `timeout`.
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }

    /// Enable TLS for the connection.
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls.enabled = enabled;
        self
    }

    /// Set custom CA certificate file path for TLS verification.
    pub fn ca_path(mut self, path: impl Into<String>) -> Self {
        self.tls.ca_path = Some(path.into());
        self
    }

    /// Skip TLS certificate verification (insecure, for testing only).
    pub fn danger_skip_tls_verify(mut self, skip: bool) -> Self {
        self.tls.danger_skip_verify = skip;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn keep_alive_secs(&self) -> u16 {
        self.keep_alive
    }

    pub fn will_message(&self) -> Option<&Message> {
        self.will.as_ref()
    }

    pub fn tls_options(&self) -> &TlsOptions {
        &self.tls
    }

    pub(crate) fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    pub(crate) fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub(crate) fn set_keep_alive(&mut self, seconds: u16) {
        self.keep_alive = seconds;
    }

    pub(crate) fn set_will(&mut self, will: Option<Message>) {
        self.will = will;
    }

    pub(crate) fn keep_alive_interval(&self) -> Option<Duration> {
        match self.keep_alive {
            0 => None,
            secs => Some(Duration::from_secs(secs as u64)),
        }
    }

    /// Checks everything a CONNECT needs before anything goes on the wire.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.host.is_empty() {
            return Err(SessionError::InvalidParameters("host is empty".into()));
        }

        if self.port == 0 {
            return Err(SessionError::InvalidParameters("port is zero".into()));
        }

        if self.client_id.is_empty() && !self.clean_session {
            return Err(SessionError::InvalidParameters(
                "an empty client identifier requires a clean session".into(),
            ));
        }

        if self.password.is_some() && self.username.is_none() {
            return Err(SessionError::InvalidParameters(
                "password set without a username".into(),
            ));
        }

        check_field_len("client identifier", self.client_id.len())?;

        if let Some(username) = &self.username {
            check_field_len("username", username.len())?;
        }

        if let Some(password) = &self.password {
            check_field_len("password", password.len())?;
        }

        if let Some(will) = &self.will {
            validate_topic_name(&will.topic)?;
            check_field_len("will payload", will.payload.len())?;
        }

        Ok(())
    }

    pub(crate) fn connect_packet(&self) -> ConnectPacket {
        let flags = ConnectFlags {
            user_name: self.username.is_some(),
            password: self.password.is_some(),
            will_retain: self.will.as_ref().map(|w| w.retain).unwrap_or(false),
            will_qos: self
                .will
                .as_ref()
                .map(|w| w.qos)
                .unwrap_or(QoS::AtMostOnce),
            will_flag: self.will.is_some(),
            clean_session: self.clean_session,
        };

        let payload = ConnectPayload {
            client_id: self.client_id.clone(),
            will_topic: self.will.as_ref().map(|w| w.topic.clone()),
            will_payload: self.will.as_ref().map(|w| w.payload.clone()),
            user_name: self.username.clone(),
            password: self.password.clone(),
        };

        ConnectPacket {
            protocol_version: self.protocol_version,
            flags,
            keepalive: self.keep_alive,
            payload,
        }
    }
}

fn check_field_len(field: &str, len: usize) -> Result<(), SessionError> {
    if len > MAX_FIELD_LENGTH {
        return Err(SessionError::InvalidParameters(format!(
            "{} is {} bytes, longer than {}",
            field, len, MAX_FIELD_LENGTH
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectOptions::new("client", "localhost", DEFAULT_PORT);

        assert_eq!(options.keep_alive_secs(), 60);
        assert!(options.clean_session);
        assert_eq!(options.protocol_version, ProtocolVersion::V3_1_1);
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
        assert_eq!(options.ack_timeout, None);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let empty_host = ConnectOptions::new("c", "", 1883);
        assert!(matches!(
            empty_host.validate(),
            Err(SessionError::InvalidParameters(_))
        ));

        let zero_port = ConnectOptions::new("c", "localhost", 0);
        assert!(matches!(
            zero_port.validate(),
            Err(SessionError::InvalidParameters(_))
        ));

        let persistent_anonymous = ConnectOptions::new("", "localhost", 1883).clean_session(false);
        assert!(matches!(
            persistent_anonymous.validate(),
            Err(SessionError::InvalidParameters(_))
        ));

        let bad_will = ConnectOptions::new("c", "localhost", 1883).will(Message::new("a/#", "x"));
        assert!(matches!(
            bad_will.validate(),
            Err(SessionError::InvalidTopic(_))
        ));
    }

    #[test]
    fn test_validate_rejects_fields_beyond_length_prefix() {
        let long = "x".repeat(MAX_FIELD_LENGTH + 1);
        let longest = "x".repeat(MAX_FIELD_LENGTH);
        let base = || ConnectOptions::new("c", "localhost", 1883);

        let oversized = [
            ConnectOptions::new(long.clone(), "localhost", 1883),
            base().username(long.clone()),
            base().username("user").password(long.clone()),
            base().will(Message::new("status", long.clone())),
        ];

        for options in &oversized {
            assert!(matches!(
                options.validate(),
                Err(SessionError::InvalidParameters(_))
            ));
        }

        let at_limit = ConnectOptions::new(longest.clone(), "localhost", 1883)
            .username(longest.clone())
            .password(longest.clone())
            .will(Message::new("status", longest));
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_connect_packet_carries_will_and_credentials() {
        let options = ConnectOptions::new("c", "localhost", 1883)
            .keep_alive(5)
            .will(Message::new("status", "gone").qos(QoS::AtLeastOnce).retain(true))
            .username("user")
            .password("secret");

        let packet = options.connect_packet();

        assert_eq!(packet.keepalive, 5);
        assert!(packet.flags.will_flag);
        assert!(packet.flags.will_retain);
        assert_eq!(packet.flags.will_qos, QoS::AtLeastOnce);
        assert_eq!(packet.payload.will_topic.as_deref(), Some("status"));
        assert_eq!(packet.payload.user_name.as_deref(), Some("user"));
        assert_eq!(packet.payload.password, Some(Bytes::from_static(b"secret")));
    }
}
