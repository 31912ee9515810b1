// src/config.rs
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "nfc-beacon",
    version,
    about = "Reads NDEF tags and forwards their content to WebSocket clients"
)]
pub struct Config {
    /// Address the WebSocket transport listens on
    #[arg(long, env = "NFC_BEACON_BIND", default_value = "127.0.0.1:3500")]
    pub bind: SocketAddr,

    /// Pixels on the LED strip
    #[arg(long, env = "NFC_BEACON_LEDS", default_value_t = 24)]
    pub leds: usize,

    /// Reader status poll interval in milliseconds
    #[arg(long, default_value_t = 500)]
    pub poll_ms: u64,

    /// Consecutive empty polls tolerated before a tag counts as gone
    #[arg(long, default_value_t = 2)]
    pub miss_threshold: u32,

    /// Bytes of tag user memory read while no NDEF message TLV has been found
    #[arg(long, default_value_t = 64)]
    pub memory_window: usize,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_device() {
        let config = Config::try_parse_from(["nfc-beacon"]).unwrap();
        assert_eq!(config.leds, 24);
        assert_eq!(config.miss_threshold, 2);
        assert_eq!(config.memory_window, 64);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "nfc-beacon",
            "--bind",
            "0.0.0.0:9000",
            "--poll-ms",
            "100",
            "--memory-window",
            "128",
        ])
        .unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.memory_window, 128);
    }

    #[test]
    fn rejects_bad_address() {
        assert!(Config::try_parse_from(["nfc-beacon", "--bind", "nowhere"]).is_err());
    }
}
