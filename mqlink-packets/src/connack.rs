use std::{convert::TryFrom, mem};

use bytes::{Buf, BufMut, BytesMut};

use mqlink_core::{
    codec::{Decoder, Encoder},
    error::Error,
    return_code::ConnectReturnCode,
};

use crate::{decode_fixed_header, encode_fixed_header, expect_remaining_len, PacketType};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAckFlags {
    pub session_present: bool,
}

impl Encoder for ConnAckFlags {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u8(self.session_present as u8);
    }

    fn encoded_size(&self) -> usize {
        mem::size_of::<u8>()
    }
}

impl Decoder for ConnAckFlags {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let encoded = u8::decode(buffer)?;

        if encoded & 0b1111_1110 != 0 {
            return Err(Error::MalformedPacket("reserved CONNACK flags set"));
        }

        Ok(ConnAckFlags {
            session_present: encoded == 1,
        })
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ConnAckPacket {
    pub flags: ConnAckFlags,
    pub return_code: ConnectReturnCode,
}

impl Encoder for ConnAckPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_fixed_header(buffer, PacketType::ConnAck, 0, 2);

        self.flags.encode(buffer);
        buffer.put_u8(self.return_code as u8);
    }
}

impl Decoder for ConnAckPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let (_, remaining_len) = decode_fixed_header(buffer, PacketType::ConnAck)?;
        expect_remaining_len(remaining_len, 2)?;

        let flags = ConnAckFlags::decode(buffer)?;
        let return_code = ConnectReturnCode::try_from(u8::decode(buffer)?)?;

        Ok(ConnAckPacket { flags, return_code })
    }
}
