use mqlink_core::{message::Message, qos::QoS};

use crate::error::SessionError;

/// Notifications raised by a client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// CONNACK accepted the connection.
    Connected { session_present: bool },

    /// The session is back in the disconnected state. Raised once per
    /// transition, after any error that caused it.
    Disconnected,

    /// The broker granted a subscription.
    Subscribed { topic: String, qos: QoS },

    Unsubscribed { topic: String },

    /// An outgoing message completed its QoS flow. QoS 0 publications carry
    /// no packet identifier.
    Published { packet_id: Option<u16> },

    /// A message arrived on a subscribed topic.
    Message(Message),

    Error(SessionError),
}
