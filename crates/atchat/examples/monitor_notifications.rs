//! Monitor unsolicited modem notifications.
//!
//! Demonstrates the notification registry: registering prefixes for
//! network registration changes, incoming calls, and incoming SMS, then
//! printing everything as it arrives. Engine lifecycle events are
//! watched on the side.
//!
//! Longest-prefix dispatch means the `+CREG:` registration here never
//! steals lines from a hypothetical `+CREG: 5` listener registered
//! elsewhere, and vice versa.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p atchat --example monitor_notifications
//! ```

use std::time::Duration;

use atchat::serial::SerialTransport;
use atchat::{AtCommand, ChatBuilder, ChatEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let serial_port = "/dev/ttyUSB2";

    println!("Connecting to modem on {}...", serial_port);

    let transport = SerialTransport::open(serial_port, 115_200).await?;
    let chat = ChatBuilder::new().build_with_transport(Box::new(transport));

    // Init: no echo, unsolicited registration reports, SMS routed to the
    // terminal as +CMT (PDU mode).
    chat.send(AtCommand::new("ATE0")).await?;
    chat.send(AtCommand::new("AT+CREG=1")).await?;
    chat.send(AtCommand::new("AT+CMGF=0")).await?;
    chat.send(AtCommand::new("AT+CNMI=2,2,0,0,0")).await?;

    // Register interests. +CMT: carries a PDU payload line.
    let mut creg = chat.register_notification("+CREG:", true).await?;
    let mut ring = chat.register_notification("RING", true).await?;
    let mut cmt = chat.register_pdu_notification("+CMT:", true).await?;
    let mut events = chat.subscribe();

    println!("Monitoring for 60 seconds...");
    println!("(Call or text the SIM to generate notifications)\n");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(remaining) => break,

            Some(n) = creg.next() => {
                println!("[registration] {}", n.line);
            }
            Some(n) = ring.next() => {
                println!("[call] {}", n.line);
            }
            Some(n) = cmt.next() => {
                println!("[sms] {}", n.line);
                if let Some(pdu) = &n.pdu {
                    println!("      pdu: {}", pdu);
                }
            }
            event = events.recv() => {
                match event {
                    Ok(ChatEvent::Disconnected) => {
                        println!("[engine] transport lost, stopping");
                        break;
                    }
                    Ok(other) => println!("[engine] {:?}", other),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        println!("(missed {} engine events due to lag)", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    chat.shutdown().await?;
    println!("\nMonitoring complete.");
    Ok(())
}
