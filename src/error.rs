// src/error.rs
use thiserror::Error;

/// Failures of the NDEF codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NdefError {
    /// Chunk flag set on the record; multi-fragment messages are not handled.
    #[error("chunked NDEF records are not supported")]
    UnsupportedChunking,
    /// TNF or well-known type byte outside URI / Text / MIME.
    #[error("unsupported record type (tnf {tnf}, type byte {type_byte:?})")]
    UnsupportedRecordType { tnf: u8, type_byte: Option<u8> },
    /// Destination buffer cannot hold header, payload and terminator.
    #[error("buffer too small: need {needed} bytes, capacity is {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },
    /// A length field points past the end of the available bytes.
    #[error("malformed {field} length: need {needed} bytes, {available} available")]
    MalformedLength {
        field: &'static str,
        needed: usize,
        available: usize,
    },
    /// Payload does not fit a short record inside a 1-byte TLV length.
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("record text is not valid {0}")]
    InvalidText(&'static str),
    /// Tag memory holds no NDEF Message TLV before the terminator.
    #[error("no NDEF message TLV found")]
    NoMessage,
}

/// Failures talking to a tag through the reader.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),
    #[error("{command} failed with status {sw1:02X} {sw2:02X}")]
    Status {
        command: &'static str,
        sw1: u8,
        sw2: u8,
    },
    #[error("short response to {0}")]
    ShortResponse(&'static str),
    #[error("unsupported card type {0}")]
    UnsupportedCard(String),
    #[error("no data could be read from the card")]
    Empty,
    #[error("tag memory ends at page {0}")]
    OutOfPages(u8),
    #[error(transparent)]
    Ndef(#[from] NdefError),
}
