use std::{convert::TryFrom, mem};

use bytes::{Buf, BufMut, BytesMut};

use mqlink_core::{
    codec::{Decoder, Encoder},
    error::Error,
    qos::QoS,
};

use crate::{decode_fixed_header, encode_fixed_header, PacketType};

const FAILURE: u8 = 0x80;

/// Per-filter outcome of a subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAckReturnCode {
    Granted(QoS),
    Failure,
}

impl Encoder for SubAckReturnCode {
    fn encode(&self, buffer: &mut BytesMut) {
        match self {
            SubAckReturnCode::Granted(qos) => buffer.put_u8(*qos as u8),
            SubAckReturnCode::Failure => buffer.put_u8(FAILURE),
        }
    }

    fn encoded_size(&self) -> usize {
        mem::size_of::<u8>()
    }
}

impl Decoder for SubAckReturnCode {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        match u8::decode(buffer)? {
            FAILURE => Ok(SubAckReturnCode::Failure),
            code @ 0x00..=0x02 => Ok(SubAckReturnCode::Granted(QoS::try_from(code)?)),
            _ => Err(Error::MalformedPacket("invalid SUBACK return code")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<SubAckReturnCode>,
}

impl Encoder for SubAckPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        let remaining_len = self.packet_id.encoded_size() + self.return_codes.encoded_size();

        encode_fixed_header(buffer, PacketType::SubAck, 0, remaining_len);

        self.packet_id.encode(buffer);
        self.return_codes.encode(buffer);
    }
}

impl Decoder for SubAckPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let (_, remaining_len) = decode_fixed_header(buffer, PacketType::SubAck)?;

        if remaining_len < 2 {
            return Err(Error::MalformedPacket("SUBACK without packet identifier"));
        }

        let packet_id = u16::decode(buffer)?;
        let mut return_codes = Vec::with_capacity(remaining_len - 2);

        for _ in 0..remaining_len - 2 {
            return_codes.push(SubAckReturnCode::decode(buffer)?);
        }

        Ok(SubAckPacket {
            packet_id,
            return_codes,
        })
    }
}
