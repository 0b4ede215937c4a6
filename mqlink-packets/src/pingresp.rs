use bytes::{Buf, BytesMut};

use mqlink_core::codec::{Decoder, Encoder};

use crate::{decode_fixed_header, encode_fixed_header, expect_remaining_len, PacketType};

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PingRespPacket {}

impl Encoder for PingRespPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_fixed_header(buffer, PacketType::PingResp, 0, 0);
    }
}

impl Decoder for PingRespPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let (_, remaining_len) = decode_fixed_header(buffer, PacketType::PingResp)?;
        expect_remaining_len(remaining_len, 0)?;

        Ok(PingRespPacket {})
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use crate::pingresp::*;

    #[test]
    fn test_pingresp_packet_encode_decode() {
        let expected = vec![0xd0, 0x00];
        let packet = PingRespPacket {};

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);

        assert_eq!(encoded.to_vec(), expected);

        let mut bytes = Bytes::from(expected);
        let new_packet = PingRespPacket::decode(&mut bytes).expect("Unexpected error");
        assert_eq!(packet, new_packet);
    }
}
