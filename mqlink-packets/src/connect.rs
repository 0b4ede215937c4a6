use std::{convert::TryFrom, mem};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use mqlink_core::{
    codec::{Decoder, Encoder},
    error::Error,
    protocol::ProtocolVersion,
    qos::QoS,
};

use crate::{decode_fixed_header, encode_fixed_header, PacketType};

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ConnectFlags {
    pub user_name: bool,
    pub password: bool,
    pub will_retain: bool,
    pub will_qos: QoS,
    pub will_flag: bool,
    pub clean_session: bool,
}

impl Encoder for ConnectFlags {
    fn encode(&self, buffer: &mut BytesMut) {
        let mut flags: u8 = 0;

        if self.user_name {
            flags = 0b1000_0000;
        }

        if self.password {
            flags |= 0b0100_0000;
        }

        if self.will_flag {
            flags |= 0b0000_0100;
            flags |= (self.will_qos as u8) << 3;

            if self.will_retain {
                flags |= 0b0010_0000;
            }
        }

        if self.clean_session {
            flags |= 0b0000_0010;
        }

        buffer.put_u8(flags);
    }

    fn encoded_size(&self) -> usize {
        mem::size_of::<u8>()
    }
}

impl Decoder for ConnectFlags {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let encoded = u8::decode(buffer)?;

        if encoded & 0b0000_0001 != 0 {
            return Err(Error::MalformedPacket("reserved CONNECT flag set"));
        }

        let flags = ConnectFlags {
            user_name: encoded & 0b1000_0000 != 0,
            password: encoded & 0b0100_0000 != 0,
            will_retain: encoded & 0b0010_0000 != 0,
            will_qos: QoS::try_from((encoded & 0b0001_1000) >> 3)?,
            will_flag: encoded & 0b0000_0100 != 0,
            clean_session: encoded & 0b0000_0010 != 0,
        };

        if !flags.will_flag && (flags.will_retain || flags.will_qos != QoS::AtMostOnce) {
            return Err(Error::MalformedPacket("will QoS or retain without a will"));
        }

        if flags.password && !flags.user_name {
            return Err(Error::MalformedPacket("password without a user name"));
        }

        Ok(flags)
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ConnectPayload {
    pub client_id: String,
    pub will_topic: Option<String>,
    pub will_payload: Option<Bytes>,
    pub user_name: Option<String>,
    pub password: Option<Bytes>,
}

impl ConnectPayload {
    fn encode_with_flags(&self, flags: &ConnectFlags, buffer: &mut BytesMut) {
        self.client_id.encode(buffer);

        if flags.will_flag {
            self.will_topic.clone().unwrap_or_default().encode(buffer);
            self.will_payload.clone().unwrap_or_default().encode(buffer);
        }

        if flags.user_name {
            self.user_name.clone().unwrap_or_default().encode(buffer);
        }

        if flags.password {
            self.password.clone().unwrap_or_default().encode(buffer);
        }
    }

    fn encoded_size_with_flags(&self, flags: &ConnectFlags) -> usize {
        let absent = mem::size_of::<u16>();
        let mut len = self.client_id.encoded_size();

        if flags.will_flag {
            len += self.will_topic.as_ref().map_or(absent, |t| t.encoded_size());
            len += self.will_payload.as_ref().map_or(absent, |p| p.encoded_size());
        }

        if flags.user_name {
            len += self.user_name.as_ref().map_or(absent, |u| u.encoded_size());
        }

        if flags.password {
            len += self.password.as_ref().map_or(absent, |p| p.encoded_size());
        }

        len
    }

    fn decode_with_flags<T: Buf>(flags: &ConnectFlags, buffer: &mut T) -> crate::Result<Self> {
        let mut payload = ConnectPayload {
            client_id: String::decode(buffer)?,
            ..Default::default()
        };

        if flags.will_flag {
            payload.will_topic = Some(String::decode(buffer)?);
            payload.will_payload = Some(Bytes::decode(buffer)?);
        }

        if flags.user_name {
            payload.user_name = Some(String::decode(buffer)?);
        }

        if flags.password {
            payload.password = Some(Bytes::decode(buffer)?);
        }

        Ok(payload)
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    pub protocol_version: ProtocolVersion,
    pub flags: ConnectFlags,
    pub keepalive: u16,
    pub payload: ConnectPayload,
}

impl ConnectPacket {
    fn remaining_len(&self) -> usize {
        let mut len = 0;

        len += self.protocol_version.protocol_name().encoded_size();
        len += self.protocol_version.protocol_level().encoded_size();
        len += self.flags.encoded_size();
        len += self.keepalive.encoded_size();
        len += self.payload.encoded_size_with_flags(&self.flags);

        len
    }
}

impl Encoder for ConnectPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_fixed_header(buffer, PacketType::Connect, 0, self.remaining_len());

        // Variable header
        self.protocol_version.protocol_name().encode(buffer);
        self.protocol_version.protocol_level().encode(buffer);
        self.flags.encode(buffer);
        self.keepalive.encode(buffer);

        self.payload.encode_with_flags(&self.flags, buffer);
    }
}

impl Decoder for ConnectPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        decode_fixed_header(buffer, PacketType::Connect)?;

        let protocol_name = String::decode(buffer)?;
        let protocol_level = u8::decode(buffer)?;

        let protocol_version = ProtocolVersion::from_name_and_level(&protocol_name, protocol_level)
            .ok_or(Error::MalformedPacket("unsupported protocol name or level"))?;

        let flags = ConnectFlags::decode(buffer)?;
        let keepalive = u16::decode(buffer)?;
        let payload = ConnectPayload::decode_with_flags(&flags, buffer)?;

        Ok(ConnectPacket {
            protocol_version,
            flags,
            keepalive,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use crate::connect::*;

    #[test]
    fn test_connect_packet_encoding() {
        let expected = vec![
            0x10, 0x0e, 0x00, 0x04, 0x4d, 0x51, 0x54, 0x54, 0x04, 0x02, 0x00, 0x3c, 0x00, 0x02,
            0x63, 0x31,
        ];

        let packet = ConnectPacket {
            protocol_version: ProtocolVersion::V3_1_1,
            flags: ConnectFlags {
                clean_session: true,
                ..Default::default()
            },
            keepalive: 60,
            payload: ConnectPayload {
                client_id: "c1".to_string(),
                ..Default::default()
            },
        };

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);

        assert_eq!(encoded.to_vec(), expected);

        let mut bytes = Bytes::from(expected);
        let new_packet = ConnectPacket::decode(&mut bytes).expect("Unexpected error");
        assert_eq!(packet, new_packet);
    }

    #[test]
    fn test_connect_packet_with_will_and_credentials() {
        let expected = vec![
            0x10, 0x1c, 0x00, 0x04, 0x4d, 0x51, 0x54, 0x54, 0x04, 0xf4, 0x00, 0x0a, 0x00, 0x01,
            0x63, 0x00, 0x01, 0x77, 0x00, 0x03, 0x62, 0x79, 0x65, 0x00, 0x01, 0x75, 0x00, 0x02,
            0x70, 0x77,
        ];

        let packet = ConnectPacket {
            protocol_version: ProtocolVersion::V3_1_1,
            flags: ConnectFlags {
                user_name: true,
                password: true,
                will_retain: true,
                will_qos: QoS::ExactlyOnce,
                will_flag: true,
                clean_session: false,
            },
            keepalive: 10,
            payload: ConnectPayload {
                client_id: "c".to_string(),
                will_topic: Some("w".to_string()),
                will_payload: Some(Bytes::from_static(b"bye")),
                user_name: Some("u".to_string()),
                password: Some(Bytes::from_static(b"pw")),
            },
        };

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);

        assert_eq!(encoded.to_vec(), expected);

        let mut bytes = Bytes::from(expected);
        let new_packet = ConnectPacket::decode(&mut bytes).expect("Unexpected error");
        assert_eq!(packet, new_packet);
    }

    #[test]
    fn test_connect_packet_v31() {
        let packet = ConnectPacket {
            protocol_version: ProtocolVersion::V3_1,
            payload: ConnectPayload {
                client_id: "legacy".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let mut encoded = BytesMut::new();
        packet.encode(&mut encoded);

        assert_eq!(&encoded[2..10], b"\x00\x06MQIsdp");
        assert_eq!(encoded[10], 0x03);

        let new_packet = ConnectPacket::decode(&mut encoded).expect("Unexpected error");
        assert_eq!(packet, new_packet);
    }

    #[test]
    fn test_connect_flags_reserved_bit() {
        let mut bytes = Bytes::from_static(&[0x03]);
        assert!(matches!(
            ConnectFlags::decode(&mut bytes),
            Err(Error::MalformedPacket(_))
        ));
    }
}
