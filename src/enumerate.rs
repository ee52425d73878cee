//! Ryder device discovery.
//!
//! A thin filter over the OS serial port listing: Ryder devices show up as
//! a Silicon Labs CP210x USB-UART bridge.

use tokio_serial::{available_ports, SerialPortInfo, SerialPortType};

use crate::error::Result;

/// USB vendor id of the Ryder's serial bridge.
pub const USB_VENDOR_ID: u16 = 0x10c4;
/// USB product id of the Ryder's serial bridge.
pub const USB_PRODUCT_ID: u16 = 0xea60;

/// List the serial ports that look like Ryder devices.
pub fn ryder_devices() -> Result<Vec<SerialPortInfo>> {
    let ports = available_ports()?;
    Ok(ports
        .into_iter()
        .filter(|port| match &port.port_type {
            SerialPortType::UsbPort(usb) => {
                usb.vid == USB_VENDOR_ID && usb.pid == USB_PRODUCT_ID
            }
            _ => false,
        })
        .collect())
}
