// src/nfc_service.rs
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use pcsc::{Context, PNP_NOTIFICATION, Protocols, ReaderState, Scope, ShareMode, State};
use std::ffi::{CStr, CString};

use crate::cards::{self, Ntag};
use crate::config::Config;
use crate::error::{NdefError, TagError};
use crate::led::LedCommand;
use crate::ndef::{self, DecodedRecord};
use crate::types::{NfcCommand, OutgoingMessage, WriteRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEdge {
    Arrived,
    Departed,
}

/// Debounces tag presence: a tag is gone only after more than
/// `miss_threshold` consecutive polls without it.
#[derive(Debug)]
pub struct PresenceTracker {
    present: bool,
    misses: u32,
    miss_threshold: u32,
}

impl PresenceTracker {
    pub fn new(miss_threshold: u32) -> Self {
        PresenceTracker {
            present: false,
            misses: 0,
            miss_threshold,
        }
    }

    pub fn update(&mut self, detected: bool) -> Option<PresenceEdge> {
        let was_present = self.present;

        if detected {
            self.misses = 0;
            self.present = true;
        } else {
            self.misses = self.misses.saturating_add(1);
            if self.misses > self.miss_threshold {
                self.present = false;
            }
        }

        match (was_present, self.present) {
            (false, true) => Some(PresenceEdge::Arrived),
            (true, false) => Some(PresenceEdge::Departed),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }
}

pub fn run(
    config: &Config,
    tx: Sender<OutgoingMessage>,
    rx: Receiver<NfcCommand>,
    led_tx: Sender<LedCommand>,
) {
    info!("Starting NFC Service...");

    let ctx = match Context::establish(Scope::User) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!("Failed to establish context: {}", err);
            let _ = tx.send(OutgoingMessage::ReaderStatus { connected: false });
            return;
        }
    };

    let mut readers_buf = [0; 2048];
    let mut reader_names: Vec<CString> = Vec::new();
    let mut reader_states = vec![ReaderState::new(PNP_NOTIFICATION(), State::UNAWARE)];
    let mut presence = PresenceTracker::new(config.miss_threshold);

    refresh_readers(&ctx, &mut readers_buf, &mut reader_names, &mut reader_states, &tx);

    loop {
        // 1. Wait for State Change (or the poll interval)
        if let Err(err) = ctx.get_status_change(config.poll_interval(), &mut reader_states) {
            if err != pcsc::Error::Timeout {
                error!("PCSC Error: {}", err);
                std::thread::sleep(config.poll_interval());
                continue;
            }
        }

        // 2. CHECK FOR COMMANDS
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                NfcCommand::Write { record } => {
                    info!("Received write command: {:?}", record);
                    handle_write_command(&ctx, &reader_names, &record, &tx);
                }
                NfcCommand::CheckReaderStatus => {
                    refresh_readers(
                        &ctx,
                        &mut readers_buf,
                        &mut reader_names,
                        &mut reader_states,
                        &tx,
                    );
                }
            }
        }

        // 3. PROCESS EVENTS
        let readers_changed = reader_states[0].event_state().intersects(State::CHANGED);
        if readers_changed {
            info!("Hardware change detected");
        }

        let card_reader: Option<CString> = reader_states
            .iter()
            .skip(1)
            .find(|rs| rs.event_state().intersects(State::PRESENT))
            .map(|rs| rs.name().to_owned());

        match presence.update(card_reader.is_some()) {
            Some(PresenceEdge::Arrived) => {
                if let Some(name) = &card_reader {
                    info!("Tag found on {:?}", name);
                    handle_card_insertion(&ctx, name, config.memory_window, &tx);
                }
            }
            Some(PresenceEdge::Departed) => {
                info!("Tag gone");
                let _ = tx.send(OutgoingMessage::TagDetached);
                let _ = led_tx.send(LedCommand::Off);
            }
            None => {}
        }

        for rs in reader_states.iter_mut() {
            rs.sync_current_state();
        }

        // 4. REFRESH LIST
        if readers_changed {
            refresh_readers(&ctx, &mut readers_buf, &mut reader_names, &mut reader_states, &tx);
        }
    }
}

fn refresh_readers(
    ctx: &Context,
    readers_buf: &mut [u8],
    reader_names: &mut Vec<CString>,
    reader_states: &mut Vec<ReaderState>,
    tx: &Sender<OutgoingMessage>,
) {
    // Keeps the PnP state (index 0) and drops everything else.
    reader_states.truncate(1);

    match ctx.list_readers(readers_buf) {
        Ok(iter) => {
            *reader_names = iter.map(CString::from).collect();
            for name in reader_names.iter() {
                reader_states.push(ReaderState::new(name.clone(), State::UNAWARE));
            }
            debug!("Readers: {:?}", reader_names);
        }
        Err(err) => {
            debug!("No readers listed: {}", err);
            reader_names.clear();
        }
    }

    let _ = tx.send(OutgoingMessage::ReaderStatus {
        connected: !reader_names.is_empty(),
    });
}

fn read_tag(ctx: &Context, reader_name: &CStr, window: usize) -> Result<DecodedRecord, TagError> {
    let card = ctx.connect(reader_name, ShareMode::Shared, Protocols::ANY)?;
    let tag = Ntag::open(card)?;
    let memory = cards::read_ndef_area(&tag, window)?;
    Ok(ndef::decode_tag_memory(&memory)?)
}

fn handle_card_insertion(
    ctx: &Context,
    reader_name: &CStr,
    window: usize,
    tx: &Sender<OutgoingMessage>,
) {
    match read_tag(ctx, reader_name, window) {
        Ok(record) => {
            let data = record.to_transport_string();
            info!("NDEF {:?} record: {}", record.record_type, data);
            let _ = tx.send(OutgoingMessage::TagRead { data });
        }
        Err(e) => {
            warn!("Tag read failed: {}", e);
            let _ = tx.send(OutgoingMessage::TagReadError {
                error: e.to_string(),
            });
        }
    }
}

/// Encodes a requested record as a complete TLV area ready for page 4.
pub fn encode_write_record(record: &WriteRecord) -> Result<Vec<u8>, NdefError> {
    match record {
        WriteRecord::Uri { uri } => {
            let (prefix, rest) = ndef::abbreviate_uri(uri);
            ndef::encode_uri(prefix, rest.as_bytes())
        }
        WriteRecord::Text { text, lang } => {
            let lang: &[u8; 2] = lang
                .as_bytes()
                .try_into()
                .map_err(|_| NdefError::InvalidText("language code"))?;
            ndef::encode_text(lang, text)
        }
        WriteRecord::Mime { mime_type, data } => ndef::encode_mime(mime_type, data.as_bytes()),
    }
}

fn write_tag(ctx: &Context, reader_name: &CStr, record: &WriteRecord) -> Result<(), TagError> {
    let tlv_data = encode_write_record(record)?;
    let card = ctx.connect(reader_name, ShareMode::Shared, Protocols::ANY)?;
    let tag = Ntag::open(card)?;
    cards::write_ndef_area(&tag, &tlv_data)
}

fn handle_write_command(
    ctx: &Context,
    reader_names: &[CString],
    record: &WriteRecord,
    tx: &Sender<OutgoingMessage>,
) {
    let Some(name) = reader_names.first() else {
        let _ = tx.send(OutgoingMessage::WriteError {
            error: "No reader connected".into(),
        });
        return;
    };

    match write_tag(ctx, name, record) {
        Ok(()) => {
            info!("Data written to {:?}", name);
            let _ = tx.send(OutgoingMessage::WriteSuccess);
        }
        Err(e) => {
            warn!("Write failed: {}", e);
            let _ = tx.send(OutgoingMessage::WriteError {
                error: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndef::{RecordFormat, RecordType};

    #[test]
    fn tag_needs_three_misses_to_leave() {
        let mut presence = PresenceTracker::new(2);
        assert_eq!(presence.update(false), None);
        assert_eq!(presence.update(true), Some(PresenceEdge::Arrived));
        assert_eq!(presence.update(true), None);

        assert_eq!(presence.update(false), None);
        assert_eq!(presence.update(false), None);
        assert!(presence.is_present());
        assert_eq!(presence.update(false), Some(PresenceEdge::Departed));
        assert_eq!(presence.update(false), None);
    }

    #[test]
    fn flicker_does_not_detach() {
        let mut presence = PresenceTracker::new(2);
        presence.update(true);
        for _ in 0..10 {
            assert_eq!(presence.update(false), None);
            assert_eq!(presence.update(true), None);
        }
        assert!(presence.is_present());
    }

    #[test]
    fn zero_threshold_detaches_on_first_miss() {
        let mut presence = PresenceTracker::new(0);
        presence.update(true);
        assert_eq!(presence.update(false), Some(PresenceEdge::Departed));
    }

    #[test]
    fn write_records_encode_to_decodable_tlv() {
        let uri = WriteRecord::Uri {
            uri: "https://www.rust-lang.org".into(),
        };
        let record = ndef::decode_tag_memory(&encode_write_record(&uri).unwrap()).unwrap();
        assert_eq!(record.format, RecordFormat::UriPrefix(0x02));
        assert_eq!(record.payload_str(), Some("https://www.rust-lang.org"));

        let text = WriteRecord::Text {
            text: "bonjour".into(),
            lang: "fr".into(),
        };
        let record = ndef::decode_tag_memory(&encode_write_record(&text).unwrap()).unwrap();
        assert_eq!(record.record_type, RecordType::Text);
        assert_eq!(record.format, RecordFormat::Language("fr".into()));

        let mime = WriteRecord::Mime {
            mime_type: "text/plain".into(),
            data: "hi".into(),
        };
        let record = ndef::decode_tag_memory(&encode_write_record(&mime).unwrap()).unwrap();
        assert_eq!(record.payload, b"hi");
    }

    #[test]
    fn text_language_must_be_two_letters() {
        let text = WriteRecord::Text {
            text: "hello".into(),
            lang: "en-US".into(),
        };
        assert_eq!(
            encode_write_record(&text),
            Err(NdefError::InvalidText("language code"))
        );
    }
}
