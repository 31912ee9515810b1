// src/cards.rs
use log::{debug, warn};
use pcsc::Card;

use crate::apdu;
use crate::error::TagError;
use crate::ndef;

pub const CARD_TYPE_MIFARE_1K: &str = "6a"; // MIFARE Classic 1K
pub const CARD_TYPE_NTAG: &str = "68"; // NTAG215/Ultralight

/// First page of user memory on Type 2 tags; the NDEF TLV area starts here.
pub const USER_MEMORY_PAGE: u8 = 4;
pub const PAGE_SIZE: usize = 4;
const READ_LEN: u8 = 16;

/// Raw page access to a tag, as the reader exposes it.
pub trait TagMemory {
    /// Reads 16 bytes (four pages) starting at `page`.
    fn read_pages(&self, page: u8) -> Result<Vec<u8>, TagError>;

    fn write_page(&self, page: u8, data: &[u8; PAGE_SIZE]) -> Result<(), TagError>;
}

/// NTAG / Ultralight tag behind a PC/SC reader.
pub struct Ntag {
    card: Card,
}

impl Ntag {
    /// Checks the card type from the ATR before handing out page access.
    pub fn open(card: Card) -> Result<Self, TagError> {
        let card_type = card_type(&card)?;
        if card_type == CARD_TYPE_MIFARE_1K {
            return Err(TagError::UnsupportedCard("MIFARE Classic 1K".into()));
        }
        if card_type != CARD_TYPE_NTAG {
            debug!("Unrecognised ATR suffix {}, treating as Type 2 tag", card_type);
        }
        Ok(Ntag { card })
    }
}

impl TagMemory for Ntag {
    fn read_pages(&self, page: u8) -> Result<Vec<u8>, TagError> {
        apdu::read_binary(&self.card, page, READ_LEN)
    }

    fn write_page(&self, page: u8, data: &[u8; PAGE_SIZE]) -> Result<(), TagError> {
        apdu::update_binary(&self.card, page, data)
    }
}

pub fn card_type(card: &Card) -> Result<String, TagError> {
    let mut names_buf = [0u8; 128];
    let mut atr_buf = [0u8; 64];
    let status = card.status2(&mut names_buf, &mut atr_buf)?;
    let atr = status.atr();
    debug!("ATR: {}", hex::encode(atr));

    Ok(match atr.last() {
        Some(last) => format!("{:x}", last),
        None => "unknown".into(),
    })
}

/// Reads user memory from page 4 until the NDEF TLV is complete. `window`
/// bounds the read only while no NDEF Message TLV has been located.
pub fn read_ndef_area<T: TagMemory>(tag: &T, window: usize) -> Result<Vec<u8>, TagError> {
    let mut full_data = Vec::new();
    let mut page = USER_MEMORY_PAGE;
    let mut target = window;

    while full_data.len() < target {
        let data = match tag.read_pages(page) {
            Ok(data) => data,
            Err(e) if full_data.is_empty() => return Err(e),
            Err(e) => {
                warn!("Read stopped at page {}: {}", page, e);
                break;
            }
        };
        if data.is_empty() {
            break;
        }
        full_data.extend_from_slice(&data);

        // 0x03 (1 byte) + Length + NDEF Data (len bytes) is all we need
        if let Ok(tlv) = ndef::find_message_tlv(&full_data) {
            target = tlv.end();
        }

        match page.checked_add((data.len() / PAGE_SIZE) as u8) {
            Some(next) => page = next,
            None => break,
        }
    }

    if full_data.is_empty() {
        return Err(TagError::Empty);
    }

    debug!("Tag memory: {}", hex::encode(&full_data));
    Ok(full_data)
}

// NTAG writes 4 bytes (1 page) at a time
pub fn pad_to_pages(data: &[u8]) -> Vec<u8> {
    let mut padded_data = data.to_vec();
    while padded_data.len() % PAGE_SIZE != 0 {
        padded_data.push(0x00);
    }
    padded_data
}

/// Writes an encoded NDEF TLV area from page 4 onwards.
pub fn write_ndef_area<T: TagMemory>(tag: &T, data: &[u8]) -> Result<(), TagError> {
    for (i, chunk) in pad_to_pages(data).chunks_exact(PAGE_SIZE).enumerate() {
        let current_page = u8::try_from(USER_MEMORY_PAGE as usize + i)
            .map_err(|_| TagError::OutOfPages(u8::MAX))?;
        let page: [u8; PAGE_SIZE] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        tag.write_page(current_page, &page)?;
    }
    Ok(())
}
