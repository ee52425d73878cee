//! Export a public identity inside a locked multi-command sequence.
//!
//! Shows the advisory lock layer: the wake + export exchange runs under
//! `sequence()` so other tasks sharing the driver stay out of the way, and
//! the on-device confirmation prompt surfaces as an event.
//!
//! Usage:
//!   cargo run --example export_identity <port> [identity-index]

use std::sync::Arc;

use ryder_serial::{commands, Event, Response, RyderConfig, RyderSerial};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("ryder_serial=debug")
        .init();

    let port = std::env::args()
        .nth(1)
        .ok_or("usage: export_identity <port> [identity-index]")?;
    let index: u8 = std::env::args()
        .nth(2)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(0);

    let ryder = Arc::new(RyderSerial::connect(port.as_str(), RyderConfig::default()));

    if let Some(mut events) = ryder.take_event_receiver() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    Event::WaitUserConfirm => println!("Confirm the export on the device..."),
                    Event::Open => println!("Connected."),
                    other => println!("driver event: {other:?}"),
                }
            }
        });
    }

    let identity = ryder
        .sequence(|| {
            let ryder = ryder.clone();
            async move {
                ryder.send_command(commands::WAKE).await?;
                ryder
                    .send(vec![commands::EXPORT_PUBLIC_IDENTITY, index])
                    .await
            }
        })
        .await?;

    match identity {
        Response::Output(data) => println!("public identity: {data:02X?}"),
        Response::Rejected => println!("export rejected on the device"),
        other => println!("unexpected response: {other:?}"),
    }

    ryder.close();
    Ok(())
}
