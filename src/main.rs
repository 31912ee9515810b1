use clap::Parser;
use crossbeam_channel::unbounded;
use log::info;
use tokio::sync::broadcast;

use nfc_beacon::config::Config;
use nfc_beacon::led::{self, LedCommand, LogStrip};
use nfc_beacon::nfc_service;
use nfc_beacon::types::{NfcCommand, OutgoingMessage};
use nfc_beacon::ws;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Config::parse();
    info!("Starting NFC beacon...");

    // Channel: transport -> NFC (Commands)
    // Crossbeam (Sync) because the NFC thread is blocking
    let (cmd_tx, cmd_rx) = unbounded::<NfcCommand>();

    // Channel: transport / NFC -> LED thread
    let (led_tx, led_rx) = unbounded::<LedCommand>();

    // Channel: NFC -> transport (Events), distributed to every client
    let (event_tx, event_rx) = broadcast::channel::<OutgoingMessage>(100);

    let leds = config.leds;
    std::thread::spawn(move || {
        let mut strip = LogStrip::default();
        led::run_strip(&mut strip, led_rx, leds);
    });

    // Bridge the blocking NFC thread into the async broadcast
    let (bridge_tx, bridge_rx) = unbounded::<OutgoingMessage>();
    let nfc_config = config.clone();
    let nfc_led_tx = led_tx.clone();
    std::thread::spawn(move || {
        nfc_service::run(&nfc_config, bridge_tx, cmd_rx, nfc_led_tx);
    });
    std::thread::spawn(move || {
        while let Ok(msg) = bridge_rx.recv() {
            let _ = event_tx.send(msg);
        }
    });

    ws::start_server(config.bind, cmd_tx, led_tx, event_rx).await;
}
