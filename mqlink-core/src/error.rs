use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The buffer does not hold a complete packet yet.
    #[error("Packet is not complete")]
    PacketIncomplete,

    #[error("Malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if more input could turn this into a successful decode.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Error::PacketIncomplete)
    }
}
