use bytes::{Buf, BytesMut};

use mqlink_core::{
    codec::{Decoder, Encoder},
    error::Error,
};

use crate::{decode_fixed_header, encode_fixed_header, PacketType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub topic_filters: Vec<String>,
}

impl UnsubscribePacket {
    pub fn remaining_len(&self) -> usize {
        self.packet_id.encoded_size() + self.topic_filters.encoded_size()
    }
}

impl Encoder for UnsubscribePacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_fixed_header(buffer, PacketType::Unsubscribe, 0b0010, self.remaining_len());

        self.packet_id.encode(buffer);
        self.topic_filters.encode(buffer);
    }
}

impl Decoder for UnsubscribePacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let (_, remaining_len) = decode_fixed_header(buffer, PacketType::Unsubscribe)?;
        let next_packet = buffer.remaining() - remaining_len;

        let packet_id = u16::decode(buffer)?;
        if packet_id == 0 {
            return Err(Error::MalformedPacket("packet identifier must be non-zero"));
        }

        let mut topic_filters = Vec::new();

        while buffer.remaining() > next_packet {
            topic_filters.push(String::decode(buffer)?);
        }

        if topic_filters.is_empty() {
            return Err(Error::MalformedPacket("UNSUBSCRIBE without topic filters"));
        }

        if buffer.remaining() != next_packet {
            return Err(Error::MalformedPacket("UNSUBSCRIBE overruns remaining length"));
        }

        Ok(UnsubscribePacket {
            packet_id,
            topic_filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use crate::unsubscribe::*;

    #[test]
    fn test_unsubscribe_packet_encode_decode() {
        let expected = vec![
            0xa2, 0x0b, 0x00, 0x02, 0x00, 0x03, 0x61, 0x2f, 0x62, 0x00, 0x02, 0x63, 0x64,
        ];

        let packet = UnsubscribePacket {
            packet_id: 2,
            topic_filters: vec!["a/b".to_string(), "cd".to_string()],
        };

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);

        assert_eq!(packet.remaining_len(), 0x0b);
        assert_eq!(encoded.to_vec(), expected);

        let mut bytes = Bytes::from(expected);
        let new_packet = UnsubscribePacket::decode(&mut bytes).expect("Unexpected error");
        assert_eq!(packet, new_packet);
    }

    #[test]
    fn test_unsubscribe_without_filters() {
        let mut bytes = Bytes::from_static(&[0xa2, 0x02, 0x00, 0x05]);

        assert!(matches!(
            UnsubscribePacket::decode(&mut bytes),
            Err(Error::MalformedPacket(_))
        ));
    }
}
