pub mod apdu;
pub mod cards;
pub mod config;
pub mod error;
pub mod led;
pub mod ndef;
pub mod nfc_service;
pub mod types;
pub mod ws;
