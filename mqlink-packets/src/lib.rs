pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod pingreq;
pub mod pingresp;
pub mod puback;
pub mod pubcomp;
pub mod publish;
pub mod pubrec;
pub mod pubrel;
pub mod suback;
pub mod subscribe;
pub mod unsuback;
pub mod unsubscribe;

use core::fmt;
use std::convert::TryFrom;

use bytes::{Buf, BufMut, BytesMut};

use mqlink_core::{
    codec::{Decoder, Encoder, VariableByteInteger, MAX_REMAINING_LENGTH},
    error::Error,
    Result,
};

use crate::{
    connack::ConnAckPacket, connect::ConnectPacket, disconnect::DisconnectPacket,
    pingreq::PingReqPacket, pingresp::PingRespPacket, puback::PubAckPacket,
    pubcomp::PubCompPacket, publish::PublishPacket, pubrec::PubRecPacket, pubrel::PubRelPacket,
    suback::SubAckPacket, subscribe::SubscribePacket, unsuback::UnsubAckPacket,
    unsubscribe::UnsubscribePacket,
};

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum ControlPacket {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    Disconnect(DisconnectPacket),
}

#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PacketType {
    Connect = 0x01,
    ConnAck,
    Publish,
    PubAck,
    PubRec,
    PubRel,
    PubComp,
    Subscribe,
    SubAck,
    Unsubscribe,
    UnsubAck,
    PingReq,
    PingResp,
    Disconnect,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        use PacketType::*;

        let res = match value {
            0x01 => Connect,
            0x02 => ConnAck,
            0x03 => Publish,
            0x04 => PubAck,
            0x05 => PubRec,
            0x06 => PubRel,
            0x07 => PubComp,
            0x08 => Subscribe,
            0x09 => SubAck,
            0x0a => Unsubscribe,
            0x0b => UnsubAck,
            0x0c => PingReq,
            0x0d => PingResp,
            0x0e => Disconnect,
            _ => return Err(Error::MalformedPacket("reserved packet type")),
        };

        Ok(res)
    }
}

impl PacketType {
    /// Flags the fixed header must carry. PUBLISH uses them for its own bits.
    fn reserved_flags(&self) -> Option<u8> {
        use PacketType::*;

        match self {
            Publish => None,
            PubRel | Subscribe | Unsubscribe => Some(0b0010),
            _ => Some(0b0000),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PacketType::*;

        let name = match self {
            Connect => "CONNECT",
            ConnAck => "CONNACK",
            Publish => "PUBLISH",
            PubAck => "PUBACK",
            PubRec => "PUBREC",
            PubRel => "PUBREL",
            PubComp => "PUBCOMP",
            Subscribe => "SUBSCRIBE",
            SubAck => "SUBACK",
            Unsubscribe => "UNSUBSCRIBE",
            UnsubAck => "UNSUBACK",
            PingReq => "PINGREQ",
            PingResp => "PINGRESP",
            Disconnect => "DISCONNECT",
        };

        write!(f, "{}", name)
    }
}

fn check_flags(packet_type: PacketType, flags: u8) -> Result<()> {
    match packet_type.reserved_flags() {
        Some(reserved) if reserved != flags => {
            Err(Error::MalformedPacket("invalid fixed header flags"))
        }
        _ => Ok(()),
    }
}

/// Reads the fixed header of a packet of the given type.
///
/// Returns the four flag bits and the remaining length.
pub(crate) fn decode_fixed_header<T: Buf>(
    buffer: &mut T,
    expected: PacketType,
) -> Result<(u8, usize)> {
    let first = u8::decode(buffer)?;
    let packet_type = PacketType::try_from(first >> 4)?;

    if packet_type != expected {
        return Err(Error::MalformedPacket("unexpected packet type"));
    }

    let flags = first & 0x0f;
    check_flags(packet_type, flags)?;

    let remaining_len = VariableByteInteger::decode(buffer)?.0 as usize;
    if buffer.remaining() < remaining_len {
        return Err(Error::PacketIncomplete);
    }

    Ok((flags, remaining_len))
}

pub(crate) fn encode_fixed_header(
    buffer: &mut BytesMut,
    packet_type: PacketType,
    flags: u8,
    remaining_len: usize,
) {
    debug_assert!(remaining_len <= MAX_REMAINING_LENGTH);

    buffer.put_u8((packet_type as u8) << 4 | (flags & 0x0f));
    VariableByteInteger(remaining_len as u32).encode(buffer);
}

/// Fails unless a fixed-size body was exactly `expected` bytes long.
pub(crate) fn expect_remaining_len(remaining_len: usize, expected: usize) -> Result<()> {
    if remaining_len != expected {
        return Err(Error::MalformedPacket("unexpected remaining length"));
    }

    Ok(())
}

impl ControlPacket {
    /// Returns the length of the first frame once `src` holds all of it.
    ///
    /// The fixed header is validated on the way, so garbage is reported as
    /// malformed without waiting for more input.
    pub fn check(src: &[u8]) -> Result<usize> {
        let mut peeker = src;

        let first = u8::decode(&mut peeker)?;
        let packet_type = PacketType::try_from(first >> 4)?;
        check_flags(packet_type, first & 0x0f)?;

        let remaining_len = VariableByteInteger::decode(&mut peeker)?.0 as usize;
        let header_len = src.len() - peeker.len();
        let frame_len = header_len + remaining_len;

        if src.len() < frame_len {
            return Err(Error::PacketIncomplete);
        }

        Ok(frame_len)
    }

    /// Decodes the first packet in `src` without consuming anything.
    ///
    /// On success returns the packet and the number of bytes it occupied.
    /// `Error::PacketIncomplete` means the frame is not complete yet.
    pub fn decode_frame(src: &[u8]) -> Result<(ControlPacket, usize)> {
        let frame_len = Self::check(src)?;
        let mut frame = &src[..frame_len];

        let packet = Self::decode_packet(&mut frame).map_err(|e| match e {
            Error::PacketIncomplete => {
                Error::MalformedPacket("packet body shorter than its remaining length")
            }
            e => e,
        })?;

        if frame.has_remaining() {
            return Err(Error::MalformedPacket("unexpected bytes after packet body"));
        }

        Ok((packet, frame_len))
    }

    /// Decodes one packet and advances `src` past it.
    ///
    /// The buffer is left untouched on error.
    pub fn parse(src: &mut BytesMut) -> Result<ControlPacket> {
        let (packet, len) = Self::decode_frame(&src[..])?;
        src.advance(len);

        Ok(packet)
    }

    fn decode_packet(src: &mut &[u8]) -> Result<ControlPacket> {
        use ControlPacket::*;

        let packet_type = match src.first() {
            Some(first) => PacketType::try_from(first >> 4)?,
            None => return Err(Error::PacketIncomplete),
        };

        let packet = match packet_type {
            PacketType::Connect => Connect(ConnectPacket::decode(src)?),
            PacketType::ConnAck => ConnAck(ConnAckPacket::decode(src)?),
            PacketType::Publish => Publish(PublishPacket::decode(src)?),
            PacketType::PubAck => PubAck(PubAckPacket::decode(src)?),
            PacketType::PubRec => PubRec(PubRecPacket::decode(src)?),
            PacketType::PubRel => PubRel(PubRelPacket::decode(src)?),
            PacketType::PubComp => PubComp(PubCompPacket::decode(src)?),
            PacketType::Subscribe => Subscribe(SubscribePacket::decode(src)?),
            PacketType::SubAck => SubAck(SubAckPacket::decode(src)?),
            PacketType::Unsubscribe => Unsubscribe(UnsubscribePacket::decode(src)?),
            PacketType::UnsubAck => UnsubAck(UnsubAckPacket::decode(src)?),
            PacketType::PingReq => PingReq(PingReqPacket::decode(src)?),
            PacketType::PingResp => PingResp(PingRespPacket::decode(src)?),
            PacketType::Disconnect => Disconnect(DisconnectPacket::decode(src)?),
        };

        Ok(packet)
    }

    pub fn packet_type(&self) -> PacketType {
        use ControlPacket::*;

        match self {
            Connect(_) => PacketType::Connect,
            ConnAck(_) => PacketType::ConnAck,
            Publish(_) => PacketType::Publish,
            PubAck(_) => PacketType::PubAck,
            PubRec(_) => PacketType::PubRec,
            PubRel(_) => PacketType::PubRel,
            PubComp(_) => PacketType::PubComp,
            Subscribe(_) => PacketType::Subscribe,
            SubAck(_) => PacketType::SubAck,
            Unsubscribe(_) => PacketType::Unsubscribe,
            UnsubAck(_) => PacketType::UnsubAck,
            PingReq(_) => PacketType::PingReq,
            PingResp(_) => PacketType::PingResp,
            Disconnect(_) => PacketType::Disconnect,
        }
    }
}

impl Encoder for ControlPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        use ControlPacket::*;

        match self {
            Connect(p) => p.encode(buffer),
            ConnAck(p) => p.encode(buffer),
            Publish(p) => p.encode(buffer),
            PubAck(p) => p.encode(buffer),
            PubRec(p) => p.encode(buffer),
            PubRel(p) => p.encode(buffer),
            PubComp(p) => p.encode(buffer),
            Subscribe(p) => p.encode(buffer),
            SubAck(p) => p.encode(buffer),
            Unsubscribe(p) => p.encode(buffer),
            UnsubAck(p) => p.encode(buffer),
            PingReq(p) => p.encode(buffer),
            PingResp(p) => p.encode(buffer),
            Disconnect(p) => p.encode(buffer),
        }
    }
}
