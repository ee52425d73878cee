//! Query a connected Ryder for its firmware info.
//!
//! Usage:
//!   cargo run --example device_info [port]
//!
//! Without an argument the first enumerated Ryder device is used.

use ryder_serial::{commands, enumerate, Event, Response, RyderConfig, RyderSerial};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("ryder_serial=info")
        .init();

    let port = match std::env::args().nth(1) {
        Some(port) => port,
        None => {
            let mut devices = enumerate::ryder_devices()?;
            let device = devices.pop().ok_or("no Ryder device found")?;
            device.port_name
        }
    };

    println!("Connecting to {port}...");
    let ryder = RyderSerial::connect(port.as_str(), RyderConfig::default());
    let mut events = ryder.take_event_receiver().ok_or("event stream taken")?;
    loop {
        match events.recv().await {
            Some(Event::Open) => break,
            Some(event) => println!("waiting for device: {event:?}"),
            None => return Err("driver went away".into()),
        }
    }
    println!("Connected.");

    ryder.send_command(commands::WAKE).await?;
    match ryder.send_command(commands::INFO).await? {
        Response::Output(info) => println!("device info: {info:02X?}"),
        other => println!("unexpected response: {other:?}"),
    }

    ryder.close();
    Ok(())
}
