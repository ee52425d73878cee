//! Serial transport layer.
//!
//! The driver core is written against [`Transport`], an async byte stream,
//! and obtains one from an [`OpenPort`] factory whenever the connection
//! supervisor (re)opens the link. Production code uses [`NativeSerial`];
//! tests and simulator harnesses hand the driver in-memory streams instead.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::config::RyderConfig;
use crate::error::Result;

/// Async byte stream connected to a Ryder device, or a stand-in for one.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Transport for T {}

/// Factory the connection supervisor uses to (re)open the serial link.
pub trait OpenPort: Send + 'static {
    type Port: Transport;

    /// Open the byte stream to the device at `path`.
    fn open_port(&mut self, path: &str, config: &RyderConfig) -> Result<Self::Port>;
}

/// USB-serial backend used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSerial;

impl OpenPort for NativeSerial {
    type Port = SerialStream;

    fn open_port(&mut self, path: &str, config: &RyderConfig) -> Result<SerialStream> {
        #[allow(unused_mut)]
        let mut port = tokio_serial::new(path, config.baud_rate).open_native_async()?;
        #[cfg(unix)]
        port.set_exclusive(config.exclusive)?;
        Ok(port)
    }
}
