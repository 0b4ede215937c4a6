use mqlink_core::{return_code::ConnectReturnCode, topic::TopicValidationError};
use thiserror::Error;

/// Errors raised by the session, both as `Err` values and through
/// [`Event::Error`](crate::Event::Error).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid connection parameters: {0}")]
    InvalidParameters(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(ConnectReturnCode),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Keep-alive timeout")]
    KeepAliveTimeout,

    #[error("Connect timeout")]
    ConnectTimeout,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid topic: {0}")]
    InvalidTopic(#[from] TopicValidationError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No packet identifier available")]
    PacketIdsExhausted,

    #[error("Subscription to '{topic}' rejected")]
    SubscriptionRejected { topic: String },

    #[error("No acknowledgment for packet {packet_id}")]
    AckTimeout { packet_id: u16 },
}

impl SessionError {
    /// Fatal errors tear the connection down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Protocol(_)
                | SessionError::KeepAliveTimeout
                | SessionError::ConnectTimeout
                | SessionError::Transport(_)
        )
    }
}

/// Errors that can occur in the MQTT client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Packet error: {0}")]
    Packet(#[from] mqlink_core::error::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl ClientError {
    /// The session error behind this failure, if any.
    pub fn session_error(&self) -> Option<&SessionError> {
        match self {
            ClientError::Session(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
