//! Send a text-mode SMS.
//!
//! Demonstrates the prompt-driven write path: `AT+CMGS` answers with a
//! `"> "` prompt, the engine then writes the message body terminated by
//! Ctrl-Z, and the modem responds with the message reference.
//!
//! The whole exchange is one [`AtCommand`]: the body goes after an
//! embedded `\r`, and the engine holds it back until the prompt arrives.
//!
//! # Requirements
//!
//! - A modem with a registered SIM
//! - A destination number you control (this sends a real SMS!)
//!
//! # Usage
//!
//! ```sh
//! cargo run -p atchat --example send_sms
//! ```

use std::time::Duration;

use atchat::serial::SerialTransport;
use atchat::{AtCommand, ChatBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let serial_port = "/dev/ttyUSB2";
    let destination = "+15551234567";
    let body = "hello from atchat";

    println!("Connecting to modem on {}...", serial_port);

    let transport = SerialTransport::open(serial_port, 115_200).await?;
    let chat = ChatBuilder::new().build_with_transport(Box::new(transport));

    chat.send(AtCommand::new("ATE0")).await?;

    // Text mode.
    let response = chat.send(AtCommand::new("AT+CMGF=1")).await?;
    anyhow::ensure!(response.success(), "modem refused text mode");

    // Submitting can take a while on a congested network, so give the
    // command its own generous deadline.
    println!("Sending SMS to {}...", destination);
    let response = chat
        .send(
            AtCommand::new(format!("AT+CMGS=\"{}\"\r{}", destination, body))
                .prefix("+CMGS:")
                .timeout(Duration::from_secs(30)),
        )
        .await?;

    if response.success() {
        match response.reader("+CMGS:").and_then(|mut r| r.number()) {
            Some(mr) => println!("Sent, message reference {}", mr),
            None => println!("Sent"),
        }
    } else {
        println!("Send failed: {}", response.final_response.line);
    }

    chat.shutdown().await?;
    Ok(())
}
