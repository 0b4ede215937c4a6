use bytes::{Buf, BytesMut};

use mqlink_core::{
    codec::{Decoder, Encoder},
    error::Error,
};

use crate::{decode_fixed_header, encode_fixed_header, expect_remaining_len, PacketType};

/// Releases a QoS 2 PUBLISH after PUBREC.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PubRelPacket {
    pub packet_id: u16,
}

impl Encoder for PubRelPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_fixed_header(buffer, PacketType::PubRel, 0b0010, self.packet_id.encoded_size());
        self.packet_id.encode(buffer);
    }
}

impl Decoder for PubRelPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let (_, remaining_len) = decode_fixed_header(buffer, PacketType::PubRel)?;
        expect_remaining_len(remaining_len, 2)?;

        let packet_id = u16::decode(buffer)?;
        if packet_id == 0 {
            return Err(Error::MalformedPacket("packet identifier must be non-zero"));
        }

        Ok(PubRelPacket { packet_id })
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use crate::pubrel::*;

    #[test]
    fn test_pubrel_packet_encode_decode() {
        let expected = vec![0x62, 0x02, 0x01, 0x2c];

        let packet = PubRelPacket { packet_id: 300 };

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);

        assert_eq!(encoded.to_vec(), expected);

        let mut bytes = Bytes::from(expected);
        let new_packet = PubRelPacket::decode(&mut bytes).expect("Unexpected error");
        assert_eq!(packet, new_packet);
    }

    #[test]
    fn test_pubrel_requires_reserved_flags() {
        let mut bytes = Bytes::from_static(&[0x60, 0x02, 0x00, 0x01]);

        assert!(matches!(
            PubRelPacket::decode(&mut bytes),
            Err(Error::MalformedPacket(_))
        ));
    }
}
