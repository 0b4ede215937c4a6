use bytes::{Buf, BytesMut};

use mqlink_core::{
    codec::{Decoder, Encoder},
    error::Error,
};

use crate::{decode_fixed_header, encode_fixed_header, expect_remaining_len, PacketType};

/// Acknowledges a QoS 1 PUBLISH.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PubAckPacket {
    pub packet_id: u16,
}

impl Encoder for PubAckPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_fixed_header(buffer, PacketType::PubAck, 0, self.packet_id.encoded_size());
        self.packet_id.encode(buffer);
    }
}

impl Decoder for PubAckPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let (_, remaining_len) = decode_fixed_header(buffer, PacketType::PubAck)?;
        expect_remaining_len(remaining_len, 2)?;

        let packet_id = u16::decode(buffer)?;
        if packet_id == 0 {
            return Err(Error::MalformedPacket("packet identifier must be non-zero"));
        }

        Ok(PubAckPacket { packet_id })
    }
}
