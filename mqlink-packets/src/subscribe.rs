use std::{convert::TryFrom, mem};

use bytes::{Buf, BytesMut};

use mqlink_core::{
    codec::{Decoder, Encoder},
    error::Error,
    qos::QoS,
};

use crate::{decode_fixed_header, encode_fixed_header, PacketType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePayload {
    pub topic_filter: String,
    pub qos: QoS,
}

impl Encoder for SubscribePayload {
    fn encode(&self, buffer: &mut BytesMut) {
        self.topic_filter.encode(buffer);
        (self.qos as u8).encode(buffer);
    }

    fn encoded_size(&self) -> usize {
        self.topic_filter.encoded_size() + mem::size_of::<u8>()
    }
}

impl Decoder for SubscribePayload {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let topic_filter = String::decode(buffer)?;
        let options = u8::decode(buffer)?;

        if options & 0b1111_1100 != 0 {
            return Err(Error::MalformedPacket("reserved subscription option bits set"));
        }

        Ok(SubscribePayload {
            topic_filter,
            qos: QoS::try_from(options)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub payload: Vec<SubscribePayload>,
}

impl SubscribePacket {
    pub fn remaining_len(&self) -> usize {
        self.packet_id.encoded_size() + self.payload.encoded_size()
    }
}

impl Encoder for SubscribePacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_fixed_header(buffer, PacketType::Subscribe, 0b0010, self.remaining_len());

        self.packet_id.encode(buffer);
        self.payload.encode(buffer);
    }
}

impl Decoder for SubscribePacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let (_, remaining_len) = decode_fixed_header(buffer, PacketType::Subscribe)?;
        let next_packet = buffer.remaining() - remaining_len;

        let packet_id = u16::decode(buffer)?;
        if packet_id == 0 {
            return Err(Error::MalformedPacket("packet identifier must be non-zero"));
        }

        let mut payload = Vec::new();

        while buffer.remaining() > next_packet {
            payload.push(SubscribePayload::decode(buffer)?);
        }

        if payload.is_empty() {
            return Err(Error::MalformedPacket("SUBSCRIBE without topic filters"));
        }

        if buffer.remaining() != next_packet {
            return Err(Error::MalformedPacket("SUBSCRIBE overruns remaining length"));
        }

        Ok(SubscribePacket { packet_id, payload })
    }
}
