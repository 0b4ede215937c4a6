use std::convert::TryFrom;

use bytes::{Buf, Bytes, BytesMut};

use mqlink_core::{
    codec::{Decoder, Encoder},
    error::Error,
    message::Message,
    qos::QoS,
    topic::validate_topic_name,
};

use crate::{decode_fixed_header, encode_fixed_header, PacketType};

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    pub dup: bool,
    pub qos_level: QoS,
    pub retain: bool,
    pub topic_name: String,
    /// Present only for QoS 1 and 2.
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

impl PublishPacket {
    pub fn from_message(message: &Message, packet_id: Option<u16>) -> Self {
        PublishPacket {
            dup: false,
            qos_level: message.qos,
            retain: message.retain,
            topic_name: message.topic.clone(),
            packet_id,
            payload: message.payload.clone(),
        }
    }

    pub fn into_message(self) -> Message {
        Message {
            topic: self.topic_name,
            payload: self.payload,
            qos: self.qos_level,
            retain: self.retain,
        }
    }

    /// Length of the variable header and payload.
    pub fn remaining_len(&self) -> usize {
        let mut remaining_len = self.topic_name.encoded_size();

        if self.qos_level.needs_packet_id() {
            remaining_len += 2;
        }

        remaining_len + self.payload.len()
    }

    fn flags(&self) -> u8 {
        let mut flags = (self.qos_level as u8) << 1;

        if self.dup {
            flags |= 0b1000;
        }

        if self.retain {
            flags |= 0b0001;
        }

        flags
    }
}

impl Encoder for PublishPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_fixed_header(
            buffer,
            PacketType::Publish,
            self.flags(),
            self.remaining_len(),
        );

        self.topic_name.encode(buffer);
        if self.qos_level.needs_packet_id() {
            self.packet_id.unwrap_or_default().encode(buffer);
        }
        buffer.extend_from_slice(&self.payload);
    }
}

impl Decoder for PublishPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let (flags, remaining_len) = decode_fixed_header(buffer, PacketType::Publish)?;
        let body_start = buffer.remaining();

        let dup = flags & 0b1000 != 0;
        let qos_level = QoS::try_from((flags & 0b0110) >> 1)?;
        let retain = flags & 0b0001 != 0;

        if dup && qos_level == QoS::AtMostOnce {
            return Err(Error::MalformedPacket("DUP set on a QoS 0 PUBLISH"));
        }

        let topic_name = String::decode(buffer)?;
        validate_topic_name(&topic_name)
            .map_err(|_| Error::MalformedPacket("invalid PUBLISH topic name"))?;

        let packet_id = if qos_level.needs_packet_id() {
            match u16::decode(buffer)? {
                0 => return Err(Error::MalformedPacket("packet identifier must be non-zero")),
                id => Some(id),
            }
        } else {
            None
        };

        let consumed = body_start - buffer.remaining();
        if consumed > remaining_len {
            return Err(Error::MalformedPacket("PUBLISH header exceeds remaining length"));
        }

        let payload = buffer.copy_to_bytes(remaining_len - consumed);

        Ok(PublishPacket {
            dup,
            qos_level,
            retain,
            topic_name,
            packet_id,
            payload,
        })
    }
}
