use std::time::Duration;

/// Configuration for a [`RyderSerial`](crate::RyderSerial) instance.
#[derive(Debug, Clone)]
pub struct RyderConfig {
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Ask the OS for an exclusive lock on the port.
    pub exclusive: bool,
    /// How long to wait between connection attempts while the port is
    /// closed.
    pub reconnect_interval: Duration,
    /// Fail every queued command when the device reports it is locked,
    /// instead of emitting an event and carrying on.
    pub reject_on_locked: bool,
}

impl Default for RyderConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200, // Ryder UART specification
            exclusive: true,
            reconnect_interval: Duration::from_millis(1000),
            reject_on_locked: false,
        }
    }
}
