use nom::error::ErrorKind;
use thiserror::Error;

use crate::message::MessageType;

/// Errors surfaced by the handshake core.
///
/// Decode, reassembly and buffer errors concern a single piece of peer input
/// and leave the session usable. Use [`Error::is_fatal`] to tell them apart
/// from errors that end the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Parse incomplete")]
    ParseIncomplete,

    #[error("Decode error: {0:?}")]
    Decode(ErrorKind),

    #[error("Unknown handshake message type: {0}")]
    UnknownMessageType(u8),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Reassembly conflict for message_seq {message_seq} at offset {offset}")]
    ReassemblyConflict { message_seq: u16, offset: u32 },

    #[error("Fragment buffer overflow: {size} > {max}")]
    FragmentBufferOverflow { size: usize, max: usize },

    #[error("Transmit queue full")]
    TransmitQueueFull,

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Missing mandatory message: {0:?}")]
    MissingMessage(MessageType),

    #[error("Cookie mismatch")]
    CookieMismatch,

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Negotiation error: {0}")]
    Negotiation(String),

    #[error("Received fatal alert: {0}")]
    Alert(u8),

    #[error("{0} timeout")]
    Timeout(&'static str),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Handshake has failed")]
    Failed,

    #[error("Handshake is closed")]
    Closed,
}

impl Error {
    /// Whether the error ends the handshake.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::ParseIncomplete
                | Error::Decode(_)
                | Error::UnknownMessageType(_)
                | Error::Encode(_)
                | Error::ReassemblyConflict { .. }
                | Error::FragmentBufferOverflow { .. }
                | Error::TransmitQueueFull
        )
    }

    /// Whether the error stems from malformed peer bytes.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Error::ParseIncomplete | Error::Decode(_) | Error::UnknownMessageType(_)
        )
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match value {
            nom::Err::Incomplete(_) => Error::ParseIncomplete,
            nom::Err::Error(e) | nom::Err::Failure(e) => match e.code {
                ErrorKind::Eof => Error::ParseIncomplete,
                kind => Error::Decode(kind),
            },
        }
    }
}

impl From<der::Error> for Error {
    fn from(value: der::Error) -> Self {
        Error::CertificateError(value.to_string())
    }
}
