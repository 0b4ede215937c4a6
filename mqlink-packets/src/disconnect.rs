use bytes::{Buf, BytesMut};

use mqlink_core::codec::{Decoder, Encoder};

use crate::{decode_fixed_header, encode_fixed_header, expect_remaining_len, PacketType};

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct DisconnectPacket {}

impl Encoder for DisconnectPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_fixed_header(buffer, PacketType::Disconnect, 0, 0);
    }
}

impl Decoder for DisconnectPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let (_, remaining_len) = decode_fixed_header(buffer, PacketType::Disconnect)?;
        expect_remaining_len(remaining_len, 0)?;

        Ok(DisconnectPacket {})
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use crate::disconnect::*;

    #[test]
    fn test_disconnect_packet_encode_decode() {
        let expected = vec![0xe0, 0x00];
        let packet = DisconnectPacket {};

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);

        assert_eq!(encoded.to_vec(), expected);

        let mut bytes = Bytes::from(expected);
        let new_packet = DisconnectPacket::decode(&mut bytes).expect("Unexpected error");
        assert_eq!(packet, new_packet);
    }
}
