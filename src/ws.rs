// src/ws.rs
use crate::led::LedCommand;
use crate::types::{IncomingMessage, NfcCommand, OutgoingMessage};
use crossbeam_channel::Sender;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use warp::Filter;

pub async fn start_server(
    bind: SocketAddr,
    nfc_cmd_tx: Sender<NfcCommand>,
    led_tx: Sender<LedCommand>,
    mut nfc_event_rx: broadcast::Receiver<OutgoingMessage>,
) {
    // Shared Broadcast Channel for WS Clients
    let (ws_tx, _) = broadcast::channel::<OutgoingMessage>(32);
    let ws_tx = Arc::new(ws_tx);

    // 1. Task to forward NFC Events -> All WS Clients
    let ws_tx_clone = ws_tx.clone();
    tokio::spawn(async move {
        loop {
            match nfc_event_rx.recv().await {
                Ok(msg) => {
                    let _ = ws_tx_clone.send(msg);
                }
                Err(RecvError::Lagged(skipped)) => warn!("Dropped {} NFC events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 2. Define WS Route (Matches root path "/")
    let ws_route = warp::path::end()
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let nfc_cmd_tx = nfc_cmd_tx.clone();
            let led_tx = led_tx.clone();
            let ws_tx = ws_tx.clone();

            ws.on_upgrade(move |socket| handle_connection(socket, nfc_cmd_tx, led_tx, ws_tx))
        });

    let routes = ws_route.with(warp::cors().allow_any_origin());

    info!("WebSocket server running on ws://{}", bind);
    warp::serve(routes).run(bind).await;
}

async fn handle_connection(
    ws: warp::ws::WebSocket,
    nfc_cmd_tx: Sender<NfcCommand>,
    led_tx: Sender<LedCommand>,
    ws_tx: Arc<broadcast::Sender<OutgoingMessage>>,
) {
    let (mut client_ws_tx, mut client_ws_rx) = ws.split();
    let mut rx_broadcast = ws_tx.subscribe();

    // Spawn task to send Broadcasts -> Client
    tokio::spawn(async move {
        loop {
            let msg = match rx_broadcast.recv().await {
                Ok(msg) => msg,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Client lagging, {} events skipped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if client_ws_tx
                .send(warp::ws::Message::text(msg.to_line()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Handle incoming lines from Client
    while let Some(result) = client_ws_rx.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
        };
        let Ok(text) = msg.to_str() else {
            continue;
        };

        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            route_line(line, &nfc_cmd_tx, &led_tx);
        }
    }
}

/// Sends one parsed transport line to the LED or NFC thread.
pub fn route_line(line: &str, nfc_cmd_tx: &Sender<NfcCommand>, led_tx: &Sender<LedCommand>) {
    match IncomingMessage::parse(line) {
        Ok(IncomingMessage::SetColor(color)) => {
            info!("RGB: {},{},{}", color.r, color.g, color.b);
            let _ = led_tx.send(LedCommand::SetColor(color));
        }
        Ok(IncomingMessage::GetReaderStatus) => {
            let _ = nfc_cmd_tx.send(NfcCommand::CheckReaderStatus);
        }
        Ok(IncomingMessage::WriteData(record)) => {
            let _ = nfc_cmd_tx.send(NfcCommand::Write { record });
        }
        Err(e) => warn!("Ignoring line {:?}: {}", line, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WriteRecord;
    use crossbeam_channel::unbounded;
    use smart_leds::RGB8;

    #[test]
    fn routes_lines_to_their_threads() {
        let (nfc_tx, nfc_rx) = unbounded();
        let (led_tx, led_rx) = unbounded();

        route_line("10,20,30", &nfc_tx, &led_tx);
        route_line(r#"{"type":"GET_READER_STATUS"}"#, &nfc_tx, &led_tx);
        route_line(
            r#"{"type":"WRITE_DATA","record":{"kind":"URI","uri":"tel:123"}}"#,
            &nfc_tx,
            &led_tx,
        );
        route_line("not a command", &nfc_tx, &led_tx);

        assert_eq!(
            led_rx.try_recv().unwrap(),
            LedCommand::SetColor(RGB8 { r: 10, g: 20, b: 30 })
        );
        assert!(led_rx.try_recv().is_err());

        assert!(matches!(nfc_rx.try_recv().unwrap(), NfcCommand::CheckReaderStatus));
        match nfc_rx.try_recv().unwrap() {
            NfcCommand::Write { record } => assert_eq!(
                record,
                WriteRecord::Uri {
                    uri: "tel:123".into()
                }
            ),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(nfc_rx.try_recv().is_err());
    }
}
