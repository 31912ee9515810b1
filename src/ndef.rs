// src/ndef.rs
use std::str;

use crate::error::NdefError;

// Type 2 Tag TLV tags
pub const TLV_NULL: u8 = 0x00;
pub const TLV_NDEF_MESSAGE: u8 = 0x03;
pub const TLV_TERMINATOR: u8 = 0xFE;
const TLV_LONG_LENGTH: u8 = 0xFF;

// Well-known record type discriminators
pub const NDEF_TYPE_URI: u8 = b'U';
pub const NDEF_TYPE_TEXT: u8 = b'T';

/// TLV tag/length pair in front of the record handed to `decode`.
const PREAMBLE_LEN: usize = 2;

pub const URI_HEADER_LEN: usize = 7;
pub const TEXT_HEADER_LEN: usize = 9;
pub const MIME_HEADER_LEN: usize = 5;
const TERMINATOR_LEN: usize = 1;

/// Largest value of a 1-byte TLV length (0xFF announces the 3-byte form).
const MAX_TLV_LEN: usize = 0xFE;

// Text status byte: bit 7 = UTF-16, bits 5-0 = language code length
const TEXT_UTF16: u8 = 0x80;
const TEXT_LANG_LEN_MASK: u8 = 0x3F;

const URI_PREFIXES: &[(u8, &str)] = &[
    (0x00, ""),
    (0x01, "http://www."),
    (0x02, "https://www."),
    (0x03, "http://"),
    (0x04, "https://"),
    (0x05, "tel:"),
    (0x06, "mailto:"),
    (0x0B, "smb://"),
    (0x1D, "file://"),
];

/// Type Name Format, the low 3 bits of the record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tnf {
    Empty = 0,
    WellKnown = 1,
    Mime = 2,
    AbsoluteUri = 3,
    External = 4,
    Unknown = 5,
    Unchanged = 6,
    Reserved = 7,
}

impl Tnf {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Tnf::Empty,
            1 => Tnf::WellKnown,
            2 => Tnf::Mime,
            3 => Tnf::AbsoluteUri,
            4 => Tnf::External,
            5 => Tnf::Unknown,
            6 => Tnf::Unchanged,
            _ => Tnf::Reserved,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// Flags of the first byte of an NDEF record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub message_begin: bool,
    pub message_end: bool,
    pub chunked: bool,
    pub short_record: bool,
    pub id_length_present: bool,
    pub tnf: Tnf,
}

impl RecordHeader {
    pub fn from_byte(byte: u8) -> Self {
        RecordHeader {
            message_begin: byte & 0x80 != 0,
            message_end: byte & 0x40 != 0,
            chunked: byte & 0x20 != 0,
            short_record: byte & 0x10 != 0,
            id_length_present: byte & 0x08 != 0,
            tnf: Tnf::from_bits(byte),
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut byte = self.tnf.bits();
        if self.message_begin {
            byte |= 0x80;
        }
        if self.message_end {
            byte |= 0x40;
        }
        if self.chunked {
            byte |= 0x20;
        }
        if self.short_record {
            byte |= 0x10;
        }
        if self.id_length_present {
            byte |= 0x08;
        }
        byte
    }

    /// Header of a complete, unfragmented, short, ID-less single record.
    pub fn single_short(tnf: Tnf) -> Self {
        RecordHeader {
            message_begin: true,
            message_end: true,
            chunked: false,
            short_record: true,
            id_length_present: false,
            tnf,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Uri,
    Text,
    Mime,
}

/// Type-specific metadata of a decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFormat {
    UriPrefix(u8),
    Language(String),
    MimeType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub record_type: RecordType,
    pub format: RecordFormat,
    /// Full URI, decoded text (UTF-8) or raw MIME bytes.
    pub payload: Vec<u8>,
}

impl DecodedRecord {
    pub fn payload_str(&self) -> Option<&str> {
        str::from_utf8(&self.payload).ok()
    }

    /// String forwarded to the transport. MIME payloads other than `text/*`
    /// go out as hex so control bytes never reach the line protocol.
    pub fn to_transport_string(&self) -> String {
        match &self.format {
            RecordFormat::MimeType(mime_type) if !mime_type.starts_with("text/") => {
                hex::encode(&self.payload)
            }
            _ => String::from_utf8_lossy(&self.payload).into_owned(),
        }
    }
}

/// Bounds-checked reader over a record buffer.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], NdefError> {
        let end = self.pos.checked_add(len).unwrap_or(usize::MAX);
        if end > self.buf.len() {
            return Err(NdefError::MalformedLength {
                field,
                needed: end,
                available: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn byte(&mut self, field: &'static str) -> Result<u8, NdefError> {
        Ok(self.take(field, 1)?[0])
    }
}

/// Decodes the single record following a 2-byte TLV preamble.
pub fn decode(buffer: &[u8]) -> Result<DecodedRecord, NdefError> {
    let mut cursor = Cursor::new(buffer);
    cursor.take("preamble", PREAMBLE_LEN)?;

    let header = RecordHeader::from_byte(cursor.byte("record header")?);
    if header.chunked {
        return Err(NdefError::UnsupportedChunking);
    }

    let type_len = cursor.byte("type length")? as usize;

    let payload_len = if header.short_record {
        cursor.byte("payload length")? as usize
    } else {
        let raw = cursor.take("payload length", 4)?;
        u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
    };

    let id_len = if header.id_length_present {
        cursor.byte("id length")? as usize
    } else {
        0
    };

    let record_type = cursor.take("type", type_len)?;
    cursor.take("id", id_len)?;

    let kind = match header.tnf {
        Tnf::WellKnown => match record_type.first().copied() {
            Some(NDEF_TYPE_URI) => RecordType::Uri,
            Some(NDEF_TYPE_TEXT) => RecordType::Text,
            other => {
                return Err(NdefError::UnsupportedRecordType {
                    tnf: header.tnf.bits(),
                    type_byte: other,
                });
            }
        },
        Tnf::Mime => RecordType::Mime,
        other => {
            return Err(NdefError::UnsupportedRecordType {
                tnf: other.bits(),
                type_byte: record_type.first().copied(),
            });
        }
    };

    let payload = cursor.take("payload", payload_len)?;

    match kind {
        RecordType::Uri => parse_uri(payload),
        RecordType::Text => parse_text(payload),
        RecordType::Mime => {
            let mime_type =
                str::from_utf8(record_type).map_err(|_| NdefError::InvalidText("MIME type"))?;
            Ok(DecodedRecord {
                record_type: RecordType::Mime,
                format: RecordFormat::MimeType(mime_type.to_string()),
                payload: payload.to_vec(),
            })
        }
    }
}

/// Parses a URI record payload: abbreviation code followed by the URI remainder.
pub fn parse_uri(payload: &[u8]) -> Result<DecodedRecord, NdefError> {
    // An empty payload carries no prefix byte: no abbreviation, empty URI
    let (code, rest) = match payload.split_first() {
        Some((&code, rest)) => (code, rest),
        None => (0x00, payload),
    };
    let suffix = str::from_utf8(rest).map_err(|_| NdefError::InvalidText("UTF-8"))?;

    let prefix = uri_prefix(code);
    let mut uri = String::with_capacity(prefix.len() + suffix.len());
    uri.push_str(prefix);
    uri.push_str(suffix);

    Ok(DecodedRecord {
        record_type: RecordType::Uri,
        format: RecordFormat::UriPrefix(code),
        payload: uri.into_bytes(),
    })
}

/// Parses a Text record payload: status byte, language code, text.
pub fn parse_text(payload: &[u8]) -> Result<DecodedRecord, NdefError> {
    if payload.len() < 3 {
        return Err(NdefError::MalformedLength {
            field: "text payload",
            needed: 3,
            available: payload.len(),
        });
    }

    let status = payload[0];
    let text_start = 1 + (status & TEXT_LANG_LEN_MASK) as usize;
    if text_start > payload.len() {
        return Err(NdefError::MalformedLength {
            field: "language code",
            needed: text_start,
            available: payload.len(),
        });
    }

    let language = str::from_utf8(&payload[1..text_start])
        .map_err(|_| NdefError::InvalidText("language code"))?;

    let body = &payload[text_start..];
    let text = if status & TEXT_UTF16 != 0 {
        decode_utf16(body)?
    } else {
        str::from_utf8(body)
            .map_err(|_| NdefError::InvalidText("UTF-8"))?
            .to_string()
    };

    Ok(DecodedRecord {
        record_type: RecordType::Text,
        format: RecordFormat::Language(language.to_string()),
        payload: text.into_bytes(),
    })
}

// Big-endian unless a byte order mark says otherwise
fn decode_utf16(body: &[u8]) -> Result<String, NdefError> {
    if body.len() % 2 != 0 {
        return Err(NdefError::InvalidText("UTF-16"));
    }

    let mut units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    match units.first() {
        Some(0xFEFF) => {
            units.remove(0);
        }
        Some(0xFFFE) => {
            units.remove(0);
            for unit in units.iter_mut() {
                *unit = unit.swap_bytes();
            }
        }
        _ => {}
    }

    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|_| NdefError::InvalidText("UTF-16"))
}

/// Expands a URI abbreviation code. Codes outside the table map to `"unknown"`.
pub fn uri_prefix(code: u8) -> &'static str {
    URI_PREFIXES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, prefix)| *prefix)
        .unwrap_or("unknown")
}

/// Picks the longest known prefix of `uri`, returning its code and the remainder.
pub fn abbreviate_uri(uri: &str) -> (u8, &str) {
    URI_PREFIXES
        .iter()
        .filter(|(code, prefix)| *code != 0x00 && uri.starts_with(prefix))
        .max_by_key(|(_, prefix)| prefix.len())
        .map(|(code, prefix)| (*code, &uri[prefix.len()..]))
        .unwrap_or((0x00, uri))
}

fn check_payload(len: usize, max: usize) -> Result<(), NdefError> {
    if len > max {
        return Err(NdefError::PayloadTooLarge { len, max });
    }
    Ok(())
}

fn check_capacity(needed: usize, capacity: usize) -> Result<(), NdefError> {
    if needed > capacity {
        return Err(NdefError::BufferTooSmall { needed, capacity });
    }
    Ok(())
}

/// Shifts the `len` payload bytes at the front of `buf` behind `head` and
/// appends the terminator. Capacity must already be checked.
fn frame_in_place(buf: &mut [u8], head: &[&[u8]], len: usize) -> usize {
    let head_len: usize = head.iter().map(|part| part.len()).sum();
    buf.copy_within(0..len, head_len);

    let mut pos = 0;
    for part in head {
        buf[pos..pos + part.len()].copy_from_slice(part);
        pos += part.len();
    }

    buf[head_len + len] = TLV_TERMINATOR;
    head_len + len + TERMINATOR_LEN
}

/// Frames the URI remainder held in `buf[..len]` as a URI record TLV.
pub fn encode_uri_in_place(prefix: u8, buf: &mut [u8], len: usize) -> Result<usize, NdefError> {
    check_payload(len, MAX_TLV_LEN - 5)?;
    check_capacity(URI_HEADER_LEN + len + TERMINATOR_LEN, buf.len())?;

    let head = [
        TLV_NDEF_MESSAGE,
        (len + 5) as u8,
        RecordHeader::single_short(Tnf::WellKnown).to_byte(),
        0x01,
        (len + 1) as u8,
        NDEF_TYPE_URI,
        prefix,
    ];
    Ok(frame_in_place(buf, &[&head[..]], len))
}

/// Frames the UTF-8 text held in `buf[..len]` as a Text record TLV.
pub fn encode_text_in_place(lang: &[u8; 2], buf: &mut [u8], len: usize) -> Result<usize, NdefError> {
    check_payload(len, MAX_TLV_LEN - 7)?;
    check_capacity(TEXT_HEADER_LEN + len + TERMINATOR_LEN, buf.len())?;

    let head = [
        TLV_NDEF_MESSAGE,
        (len + 7) as u8,
        RecordHeader::single_short(Tnf::WellKnown).to_byte(),
        0x01,
        (len + 3) as u8,
        NDEF_TYPE_TEXT,
        0x02,
        lang[0],
        lang[1],
    ];
    Ok(frame_in_place(buf, &[&head[..]], len))
}

/// Frames the data held in `buf[..len]` as a MIME record TLV of `mime_type`.
pub fn encode_mime_in_place(mime_type: &str, buf: &mut [u8], len: usize) -> Result<usize, NdefError> {
    let type_len = mime_type.len();
    check_payload(type_len + len, MAX_TLV_LEN - 3)?;
    check_capacity(MIME_HEADER_LEN + type_len + len + TERMINATOR_LEN, buf.len())?;

    let head = [
        TLV_NDEF_MESSAGE,
        (len + type_len + 3) as u8,
        RecordHeader::single_short(Tnf::Mime).to_byte(),
        type_len as u8,
        len as u8,
    ];
    Ok(frame_in_place(buf, &[&head[..], mime_type.as_bytes()], len))
}

pub fn encode_uri(prefix: u8, suffix: &[u8]) -> Result<Vec<u8>, NdefError> {
    let mut buf = staged(suffix, URI_HEADER_LEN);
    let len = encode_uri_in_place(prefix, &mut buf, suffix.len())?;
    buf.truncate(len);
    Ok(buf)
}

pub fn encode_text(lang: &[u8; 2], text: &str) -> Result<Vec<u8>, NdefError> {
    let mut buf = staged(text.as_bytes(), TEXT_HEADER_LEN);
    let len = encode_text_in_place(lang, &mut buf, text.len())?;
    buf.truncate(len);
    Ok(buf)
}

pub fn encode_mime(mime_type: &str, data: &[u8]) -> Result<Vec<u8>, NdefError> {
    let mut buf = staged(data, MIME_HEADER_LEN + mime_type.len());
    let len = encode_mime_in_place(mime_type, &mut buf, data.len())?;
    buf.truncate(len);
    Ok(buf)
}

// Payload at the front, room for header and terminator behind it
fn staged(payload: &[u8], header_len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; payload.len() + header_len + TERMINATOR_LEN];
    buf[..payload.len()].copy_from_slice(payload);
    buf
}

/// Location of the NDEF Message TLV inside tag memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageTlv {
    pub offset: usize,
    pub value_offset: usize,
    pub length: usize,
}

impl MessageTlv {
    pub fn end(&self) -> usize {
        self.value_offset + self.length
    }
}

fn read_tlv_length(memory: &[u8], at: usize) -> Result<(usize, usize), NdefError> {
    let malformed = |needed| NdefError::MalformedLength {
        field: "TLV",
        needed,
        available: memory.len(),
    };

    let first = *memory.get(at).ok_or(malformed(at + 1))?;
    if first != TLV_LONG_LENGTH {
        return Ok((first as usize, at + 1));
    }
    match memory.get(at + 1..at + 3) {
        Some(&[hi, lo]) => Ok((u16::from_be_bytes([hi, lo]) as usize, at + 3)),
        _ => Err(malformed(at + 3)),
    }
}

/// Walks Type 2 Tag TLVs up to the first NDEF Message TLV.
pub fn find_message_tlv(memory: &[u8]) -> Result<MessageTlv, NdefError> {
    let mut pos = 0;
    while pos < memory.len() {
        match memory[pos] {
            TLV_NULL => {
                pos += 1;
            }
            TLV_TERMINATOR => return Err(NdefError::NoMessage),
            tag => {
                let (length, value_offset) = read_tlv_length(memory, pos + 1)?;
                if tag == TLV_NDEF_MESSAGE {
                    return Ok(MessageTlv {
                        offset: pos,
                        value_offset,
                        length,
                    });
                }
                pos = value_offset + length;
            }
        }
    }
    Err(NdefError::NoMessage)
}

/// Decodes the record inside the NDEF Message TLV of raw tag memory.
pub fn decode_tag_memory(memory: &[u8]) -> Result<DecodedRecord, NdefError> {
    let tlv = find_message_tlv(memory)?;
    if tlv.end() > memory.len() {
        return Err(NdefError::MalformedLength {
            field: "NDEF message",
            needed: tlv.end(),
            available: memory.len(),
        });
    }
    decode(&memory[tlv.value_offset - PREAMBLE_LEN..tlv.end()])
}
