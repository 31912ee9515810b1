// src/types.rs
use serde::Deserialize;
use smart_leds::RGB8;
use thiserror::Error;

// Events sent TO the transport, one text line each
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutgoingMessage {
    TagRead { data: String },
    TagDetached,
    TagReadError { error: String },
    ReaderStatus { connected: bool },
    WriteSuccess,
    WriteError { error: String },
}

impl OutgoingMessage {
    pub fn to_line(&self) -> String {
        match self {
            OutgoingMessage::TagRead { data } => format!("event_rfid|data_{}", data),
            OutgoingMessage::TagDetached => "event_rfid-detach|data_null".into(),
            OutgoingMessage::TagReadError { error } => format!("event_rfid-error|data_{}", error),
            OutgoingMessage::ReaderStatus { connected: true } => {
                "event_reader|data_connected".into()
            }
            OutgoingMessage::ReaderStatus { connected: false } => {
                "event_reader|data_disconnected".into()
            }
            OutgoingMessage::WriteSuccess => "event_write|data_ok".into(),
            OutgoingMessage::WriteError { error } => format!("event_write-error|data_{}", error),
        }
    }
}

/// Record to put on a tag, as requested by a client.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteRecord {
    Uri {
        uri: String,
    },
    Text {
        text: String,
        #[serde(default = "default_lang")]
        lang: String,
    },
    Mime {
        mime_type: String,
        data: String,
    },
}

fn default_lang() -> String {
    "en".into()
}

// JSON commands received FROM the transport
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum JsonCommand {
    GetReaderStatus,
    WriteData { record: WriteRecord },
}

// Anything received FROM the transport
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    SetColor(RGB8),
    GetReaderStatus,
    WriteData(WriteRecord),
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("expected R,G,B but got {0:?}")]
    Color(String),
    #[error("bad command: {0}")]
    Json(#[from] serde_json::Error),
}

impl IncomingMessage {
    /// Parses one transport line: `R,G,B` or a JSON command.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.starts_with('{') {
            return Ok(match serde_json::from_str::<JsonCommand>(line)? {
                JsonCommand::GetReaderStatus => IncomingMessage::GetReaderStatus,
                JsonCommand::WriteData { record } => IncomingMessage::WriteData(record),
            });
        }
        parse_rgb(line).map(IncomingMessage::SetColor)
    }
}

fn parse_rgb(line: &str) -> Result<RGB8, ParseError> {
    let bad = || ParseError::Color(line.to_string());

    let channels = line
        .split(',')
        .map(|item| item.trim().parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| bad())?;

    match channels.as_slice() {
        [r, g, b] => Ok(RGB8 {
            r: *r,
            g: *g,
            b: *b,
        }),
        _ => Err(bad()),
    }
}

// Internal commands sent from the transport -> NFC thread
#[derive(Debug)]
pub enum NfcCommand {
    Write { record: WriteRecord },
    CheckReaderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_lines() {
        let read = OutgoingMessage::TagRead {
            data: "http://example.com".into(),
        };
        assert_eq!(read.to_line(), "event_rfid|data_http://example.com");
        assert_eq!(
            OutgoingMessage::TagDetached.to_line(),
            "event_rfid-detach|data_null"
        );
        assert_eq!(
            OutgoingMessage::ReaderStatus { connected: false }.to_line(),
            "event_reader|data_disconnected"
        );
    }

    #[test]
    fn parses_rgb_lines() {
        assert_eq!(
            IncomingMessage::parse("255,128,0").unwrap(),
            IncomingMessage::SetColor(RGB8 { r: 255, g: 128, b: 0 })
        );
        assert_eq!(
            IncomingMessage::parse(" 1, 2 ,3\r\n").unwrap(),
            IncomingMessage::SetColor(RGB8 { r: 1, g: 2, b: 3 })
        );
    }

    #[test]
    fn rejects_bad_rgb_lines() {
        for line in ["", "1,2", "1,2,3,4", "256,0,0", "red,0,0"] {
            assert!(
                matches!(IncomingMessage::parse(line), Err(ParseError::Color(_))),
                "{line:?} should be rejected"
            );
        }
    }

    #[test]
    fn parses_json_commands() {
        assert_eq!(
            IncomingMessage::parse(r#"{"type":"GET_READER_STATUS"}"#).unwrap(),
            IncomingMessage::GetReaderStatus
        );

        let line = r#"{"type":"WRITE_DATA","record":{"kind":"URI","uri":"https://rust-lang.org"}}"#;
        assert_eq!(
            IncomingMessage::parse(line).unwrap(),
            IncomingMessage::WriteData(WriteRecord::Uri {
                uri: "https://rust-lang.org".into()
            })
        );

        let line = r#"{"type":"WRITE_DATA","record":{"kind":"TEXT","text":"hi"}}"#;
        assert_eq!(
            IncomingMessage::parse(line).unwrap(),
            IncomingMessage::WriteData(WriteRecord::Text {
                text: "hi".into(),
                lang: "en".into()
            })
        );
    }

    #[test]
    fn rejects_unknown_json() {
        assert!(matches!(
            IncomingMessage::parse(r#"{"type":"SELF_DESTRUCT"}"#),
            Err(ParseError::Json(_))
        ));
    }
}
