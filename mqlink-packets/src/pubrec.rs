use bytes::{Buf, BytesMut};

use mqlink_core::{
    codec::{Decoder, Encoder},
    error::Error,
};

use crate::{decode_fixed_header, encode_fixed_header, expect_remaining_len, PacketType};

/// First acknowledgment of a QoS 2 PUBLISH.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PubRecPacket {
    pub packet_id: u16,
}

impl Encoder for PubRecPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_fixed_header(buffer, PacketType::PubRec, 0, self.packet_id.encoded_size());
        self.packet_id.encode(buffer);
    }
}

impl Decoder for PubRecPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let (_, remaining_len) = decode_fixed_header(buffer, PacketType::PubRec)?;
        expect_remaining_len(remaining_len, 2)?;

        let packet_id = u16::decode(buffer)?;
        if packet_id == 0 {
            return Err(Error::MalformedPacket("packet identifier must be non-zero"));
        }

        Ok(PubRecPacket { packet_id })
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use crate::pubrec::*;

    #[test]
    fn test_pubrec_packet_encode_decode() {
        let expected = vec![0x50, 0x02, 0x01, 0x2c];

        let packet = PubRecPacket { packet_id: 300 };

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);

        assert_eq!(encoded.to_vec(), expected);

        let mut bytes = Bytes::from(expected);
        let new_packet = PubRecPacket::decode(&mut bytes).expect("Unexpected error");
        assert_eq!(packet, new_packet);
    }
}
