// src/apdu.rs
use pcsc::Card;

use crate::error::TagError;

// 0x90 0x00 is Success
fn check_status<'a>(command: &'static str, resp: &'a [u8]) -> Result<&'a [u8], TagError> {
    match resp {
        [data @ .., 0x90, 0x00] => Ok(data),
        [.., sw1, sw2] => Err(TagError::Status {
            command,
            sw1: *sw1,
            sw2: *sw2,
        }),
        _ => Err(TagError::ShortResponse(command)),
    }
}

// Read: FF B0 00 Block Len
pub fn read_binary(card: &Card, block: u8, length: u8) -> Result<Vec<u8>, TagError> {
    let apdu = [0xFF, 0xB0, 0x00, block, length];
    let mut recv_buffer = [0u8; 256];

    let resp = card.transmit(&apdu, &mut recv_buffer)?;
    // Return data without status word
    check_status("READ BINARY", resp).map(|data| data.to_vec())
}

// Write: FF D6 00 Block Len [Data]
pub fn update_binary(card: &Card, block: u8, data: &[u8]) -> Result<(), TagError> {
    let mut apdu = vec![0xFF, 0xD6, 0x00, block, data.len() as u8];
    apdu.extend_from_slice(data);

    let mut recv_buffer = [0u8; 256];
    let resp = card.transmit(&apdu, &mut recv_buffer)?;
    check_status("UPDATE BINARY", resp).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_success_status() {
        assert_eq!(
            check_status("READ BINARY", &[0x01, 0x02, 0x90, 0x00]).unwrap(),
            &[0x01, 0x02]
        );
        assert!(check_status("UPDATE BINARY", &[0x90, 0x00]).unwrap().is_empty());
    }

    #[test]
    fn reports_failure_status() {
        assert!(matches!(
            check_status("READ BINARY", &[0x63, 0x00]),
            Err(TagError::Status { sw1: 0x63, sw2: 0x00, .. })
        ));
        assert!(matches!(
            check_status("READ BINARY", &[0x90]),
            Err(TagError::ShortResponse("READ BINARY"))
        ));
    }
}
