//! CONNACK return codes.

use core::fmt;
use std::convert::TryFrom;

use crate::error::Error;

/// Outcome of a connection attempt as reported by the broker in CONNACK.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Hash)]
pub enum ConnectReturnCode {
    #[default]
    Accepted = 0x00,
    UnacceptableProtocolVersion = 0x01,
    IdentifierRejected = 0x02,
    ServerUnavailable = 0x03,
    BadUsernameOrPassword = 0x04,
    NotAuthorized = 0x05,
}

impl ConnectReturnCode {
    pub fn is_accepted(&self) -> bool {
        *self == ConnectReturnCode::Accepted
    }
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ConnectReturnCode::*;

        let code = match value {
            0x00 => Accepted,
            0x01 => UnacceptableProtocolVersion,
            0x02 => IdentifierRejected,
            0x03 => ServerUnavailable,
            0x04 => BadUsernameOrPassword,
            0x05 => NotAuthorized,
            _ => return Err(Error::MalformedPacket("unknown CONNACK return code")),
        };

        Ok(code)
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConnectReturnCode::*;

        let msg = match self {
            Accepted => "connection accepted",
            UnacceptableProtocolVersion => "unacceptable protocol version",
            IdentifierRejected => "identifier rejected",
            ServerUnavailable => "broker unavailable",
            BadUsernameOrPassword => "bad user name or password",
            NotAuthorized => "not authorized",
        };

        write!(f, "{}", msg)
    }
}
