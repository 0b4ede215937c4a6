use std::mem;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;

/// Largest value the remaining-length field can carry (four bytes of seven bits).
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

pub trait Decoder {
    fn decode<T>(buffer: &mut T) -> crate::Result<Self>
    where
        Self: Sized,
        T: Buf;
}

pub trait Encoder {
    fn encode(&self, buffer: &mut BytesMut);
    fn encoded_size(&self) -> usize {
        mem::size_of_val(self)
    }
}

fn encode_var_byte_integer(value: u32, encoded: &mut BytesMut) {
    let mut x = value;

    loop {
        let mut encoded_byte: u8 = (x % 128) as u8;
        x /= 128;

        if x > 0 {
            encoded_byte |= 0b1000_0000;
        }

        encoded.put_u8(encoded_byte);

        if x == 0 {
            break;
        }
    }
}

// Running out of input is `PacketIncomplete`, a fourth byte that still sets the
// continuation bit is malformed no matter what follows it.
fn decode_var_byte_integer<T: Buf>(encoded: &mut T) -> crate::Result<VariableByteInteger> {
    let mut multiplier: u32 = 1;
    let mut value: u32 = 0;

    loop {
        if !encoded.has_remaining() {
            return Err(Error::PacketIncomplete);
        }

        let encoded_byte = encoded.get_u8();
        value += (encoded_byte & 0b0111_1111) as u32 * multiplier;

        if (encoded_byte & 0b1000_0000) == 0 {
            break;
        }

        if multiplier == 128 * 128 * 128 {
            return Err(Error::MalformedPacket(
                "remaining length longer than four bytes",
            ));
        }

        multiplier *= 128;
    }

    Ok(VariableByteInteger(value))
}

#[derive(PartialEq, Eq, Debug, Default, Clone, Copy)]
pub struct VariableByteInteger(pub u32);

impl Encoder for VariableByteInteger {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_var_byte_integer(self.0, buffer);
    }

    fn encoded_size(&self) -> usize {
        match self.0 {
            0..=127 => 1,
            128..=16383 => 2,
            16384..=2097151 => 3,
            2097152..=268435455 => 4,
            _ => unreachable!("remaining length above MAX_REMAINING_LENGTH, caller must bound it"),
        }
    }
}

impl Decoder for VariableByteInteger {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        decode_var_byte_integer(buffer)
    }
}

impl Encoder for String {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u16(self.len() as u16);
        buffer.put(self.as_bytes());
    }

    fn encoded_size(&self) -> usize {
        self.len() + mem::size_of::<u16>()
    }
}

impl Decoder for String {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let length = u16::decode(buffer)? as usize;
        if buffer.remaining() < length {
            return Err(Error::PacketIncomplete);
        }

        let bytes = buffer.copy_to_bytes(length);

        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::MalformedPacket("string is not valid UTF-8"))
    }
}

impl Encoder for &'static str {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u16(self.len() as u16);
        buffer.put(self.as_bytes());
    }

    fn encoded_size(&self) -> usize {
        self.len() + mem::size_of::<u16>()
    }
}

impl Encoder for u8 {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u8(*self);
    }
}

impl Decoder for u8 {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        if !buffer.has_remaining() {
            return Err(Error::PacketIncomplete);
        }

        Ok(buffer.get_u8())
    }
}

impl Encoder for u16 {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u16(*self);
    }
}

impl Decoder for u16 {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        if buffer.remaining() < 2 {
            return Err(Error::PacketIncomplete);
        }

        Ok(buffer.get_u16())
    }
}

/// Length-prefixed binary data (will payload, password).
impl Encoder for Bytes {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u16(self.len() as u16);
        buffer.extend_from_slice(self);
    }

    fn encoded_size(&self) -> usize {
        mem::size_of::<u16>() + self.len()
    }
}

impl Decoder for Bytes {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let length = u16::decode(buffer)? as usize;
        if buffer.remaining() < length {
            return Err(Error::PacketIncomplete);
        }

        Ok(buffer.copy_to_bytes(length))
    }
}

impl<T> Encoder for Option<T>
where
    T: Encoder,
{
    fn encode(&self, buffer: &mut BytesMut) {
        if let Some(v) = self {
            v.encode(buffer);
        }
    }

    fn encoded_size(&self) -> usize {
        match self {
            Some(v) => v.encoded_size(),
            None => 0,
        }
    }
}

impl<T> Encoder for Vec<T>
where
    T: Encoder,
{
    fn encode(&self, buffer: &mut BytesMut) {
        for e in self {
            e.encode(buffer);
        }
    }

    fn encoded_size(&self) -> usize {
        self.iter().map(Encoder::encoded_size).sum()
    }
}
