//! Application message type.

use bytes::Bytes;

use crate::qos::QoS;

/// An application message: what gets published, delivered, or left as a will.
///
/// Copies never share mutable state. The payload is an immutable [`Bytes`]
/// handle, so cloning is cheap and changing one copy (through the setters or
/// the public fields) replaces its value without touching any other copy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    pub fn qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.topic = topic.into();
    }

    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    pub fn set_retain(&mut self, retain: bool) {
        self.retain = retain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copies_are_independent() {
        let original = Message::new("a/b", "first").retain(true);
        let mut copy = original.clone();

        copy.set_payload("second");
        copy.set_topic("c/d");
        copy.set_retain(false);

        assert_eq!(original.topic, "a/b");
        assert_eq!(original.payload, Bytes::from_static(b"first"));
        assert!(original.retain);

        assert_eq!(copy.topic, "c/d");
        assert_eq!(copy.payload, Bytes::from_static(b"second"));
        assert!(!copy.retain);
    }

    #[test]
    fn test_builder_defaults() {
        let message = Message::new("t", vec![1u8, 2, 3]);

        assert_eq!(message.qos, QoS::AtMostOnce);
        assert!(!message.retain);
        assert_eq!(message.payload.len(), 3);
    }
}
