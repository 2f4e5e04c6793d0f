//! Hand the transport to a PPP stack and take it back.
//!
//! After a data call answers `CONNECT`, the line carries PPP frames, not
//! AT text, so the engine must get out of the way. `suspend()` stops all
//! engine IO and hands the boxed transport out; once the data session
//! ends, `resume()` reinstalls it and queued commands continue.
//!
//! This example dials a GPRS context, pretends to run PPP for a few
//! seconds, then hangs up and verifies the command channel still works.
//!
//! # Requirements
//!
//! - A SIM with a data plan and the APN configured for context 1
//!
//! # Usage
//!
//! ```sh
//! cargo run -p atchat --example ppp_handover
//! ```

use std::time::Duration;

use atchat::serial::SerialTransport;
use atchat::{AtCommand, ChatBuilder, FinalKind, Transport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let serial_port = "/dev/ttyUSB2";

    println!("Connecting to modem on {}...", serial_port);

    let transport = SerialTransport::open(serial_port, 115_200).await?;
    let chat = ChatBuilder::new().build_with_transport(Box::new(transport));

    chat.send(AtCommand::new("ATE0")).await?;
    chat.send(AtCommand::new("AT+CGDCONT=1,\"IP\",\"internet\"")).await?;

    // Dial. CONNECT is a success final; anything else aborts.
    println!("Dialing *99#...");
    let response = chat
        .send(AtCommand::new("ATD*99***1#").timeout(Duration::from_secs(90)))
        .await?;
    anyhow::ensure!(
        response.final_response.kind == FinalKind::Connect,
        "dial failed: {}",
        response.final_response.line
    );
    println!("Carrier up: {}", response.final_response.line);

    // The engine stops reading and writing; we own the wire now.
    let mut transport = chat.suspend().await?;
    println!("Engine suspended, transport handed over.");

    // A real application would drive pppd or a PPP crate here. We just
    // sit on the link briefly, then drop back to command mode with the
    // +++ escape (1s of guard silence on each side).
    tokio::time::sleep(Duration::from_secs(3)).await;
    transport.send(b"+++").await?;
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Give the transport back and confirm the AT channel survived.
    chat.resume(transport).await?;
    println!("Engine resumed.");

    let response = chat.send(AtCommand::new("ATH")).await?;
    println!("Hangup: {}", response.final_response.line);

    let response = chat.send(AtCommand::new("AT")).await?;
    anyhow::ensure!(response.success(), "modem unresponsive after resume");
    println!("Command channel is back.");

    chat.shutdown().await?;
    Ok(())
}
