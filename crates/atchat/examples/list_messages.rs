//! Stream a stored-message listing.
//!
//! `AT+CMGL` can return hundreds of entries; `send_listing()` streams
//! each one as it arrives instead of buffering the whole response. In
//! PDU mode every `+CMGL:` header line is followed by a raw payload
//! line, captured via `expect_pdu()`.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p atchat --example list_messages
//! ```

use std::time::Duration;

use atchat::serial::SerialTransport;
use atchat::{AtCommand, ChatBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let serial_port = "/dev/ttyUSB2";

    println!("Connecting to modem on {}...", serial_port);

    let transport = SerialTransport::open(serial_port, 115_200).await?;
    let chat = ChatBuilder::new().build_with_transport(Box::new(transport));

    chat.send(AtCommand::new("ATE0")).await?;

    // PDU mode; 4 = all messages.
    let response = chat.send(AtCommand::new("AT+CMGF=0")).await?;
    anyhow::ensure!(response.success(), "modem refused PDU mode");

    let (mut listing, pending) = chat
        .send_listing(
            AtCommand::new("AT+CMGL=4")
                .prefix("+CMGL:")
                .expect_pdu()
                .timeout(Duration::from_secs(30)),
        )
        .await?;

    let mut count = 0u32;
    while let Some(entry) = listing.next().await {
        count += 1;

        // +CMGL: <index>,<stat>,[<alpha>],<length>
        let index = entry
            .reader("+CMGL:")
            .and_then(|mut r| r.number())
            .unwrap_or(0);

        println!("message {} (storage index {}):", count, index);
        println!("  header: {}", entry.line);
        match &entry.pdu {
            Some(pdu) => println!("  pdu:    {}", pdu),
            None => println!("  pdu:    <missing>"),
        }
    }

    // The listing stream ends when the final response arrives.
    let response = pending.wait().await?;
    if response.success() {
        println!("\n{} message(s) listed.", count);
    } else {
        println!("\nListing failed: {}", response.final_response.line);
    }

    chat.shutdown().await?;
    Ok(())
}
