//! Host-side driver for the Ryder hardware wallet.
//!
//! Talks to a Ryder, or its simulator, over a USB-serial link and takes
//! care of the three hard parts: framing and decoding the byte-oriented
//! response protocol, keeping command exchanges strictly one at a time in
//! FIFO order, and supervising the connection with automatic reconnects.
//!
//! # Architecture
//!
//! - **Protocol layer** (`protocol`): pure byte-level logic, covering the
//!   response alphabet and output-record escape framing.
//!
//! - **Driver task** (`driver`): a single background task owns the port,
//!   the command queue with its in-flight head, the advisory lock queue,
//!   and the watchdog. The public [`RyderSerial`] handle feeds it over a
//!   mailbox, and each command completes through a single-shot channel.
//!
//! - **Transport layer** (`transport`): the serial link behind a small
//!   factory trait so tests can swap in an in-memory stream.
//!
//! # Example
//!
//! ```no_run
//! use ryder_serial::{commands, Response, RyderConfig, RyderSerial};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ryder = RyderSerial::connect("/dev/ttyUSB0", RyderConfig::default());
//! ryder.send_command(commands::WAKE).await?;
//! if let Response::Output(info) = ryder.send_command(commands::INFO).await? {
//!     println!("firmware: {:02X?}", info);
//! }
//! ryder.close();
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod commands;
pub mod config;
pub mod driver;
pub mod enumerate;
pub mod error;
pub mod protocol;
pub mod response;
pub mod transport;

mod engine;
mod lock;
mod queue;

// Public API exports
pub use config::RyderConfig;
pub use driver::{Event, RyderSerial};
pub use error::{DeviceError, Result, RyderError};
pub use response::Response;
