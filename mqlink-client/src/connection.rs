use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};

use mqlink_core::{codec::Encoder, error::Error, Result};
use mqlink_packets::ControlPacket;

use crate::transport::BoxedStream;

/// Default capacity for read buffer (8KB)
const READ_BUFFER_CAPACITY: usize = 8192;

/// Default capacity for write buffer (512 bytes - typical packet size)
const WRITE_BUFFER_CAPACITY: usize = 512;

/// Packet framing over an opened transport stream.
pub(crate) struct Connection {
    stream: BufWriter<BoxedStream>,
    /// Reusable read buffer - avoids allocation per read
    read_buffer: BytesMut,
    /// Reusable write buffer - avoids allocation per write
    write_buffer: BytesMut,
}

impl Connection {
    pub(crate) fn new(stream: BoxedStream) -> Connection {
        Connection {
            stream: BufWriter::new(stream),
            read_buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            write_buffer: BytesMut::with_capacity(WRITE_BUFFER_CAPACITY),
        }
    }

    /// Reads the next packet. `Ok(None)` means the peer closed the stream
    /// cleanly between packets.
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    pub(crate) async fn read_packet(&mut self) -> Result<Option<ControlPacket>> {
        loop {
            if let Some(packet) = self.parse_packet()? {
                return Ok(Some(packet));
            }

            if 0 == self.stream.read_buf(&mut self.read_buffer).await? {
                if self.read_buffer.is_empty() {
                    return Ok(None);
                } else {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed in the middle of a packet",
                    )));
                }
            }
        }
    }

    /// Buffers a packet. Nothing reaches the peer before [`Connection::flush`].
    pub(crate) async fn write_packet(&mut self, packet: &ControlPacket) -> Result<()> {
        // Clear and reuse the write buffer instead of allocating a new one
        self.write_buffer.clear();

        packet.encode(&mut self.write_buffer);

        self.stream.write_all(&self.write_buffer).await?;

        Ok(())
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        self.stream.flush().await?;

        Ok(())
    }

    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;

        Ok(())
    }

    fn parse_packet(&mut self) -> Result<Option<ControlPacket>> {
        match ControlPacket::parse(&mut self.read_buffer) {
            Ok(packet) => Ok(Some(packet)),
            // Not enough bytes in the buffer to parse a packet
            Err(Error::PacketIncomplete) => Ok(None),
            // An actual error
            Err(e) => Err(e),
        }
    }
}
