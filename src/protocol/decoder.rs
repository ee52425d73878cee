use crate::error::DeviceError;

// Response bytes the device may send as the first byte of a response.
pub const RESPONSE_OK: u8 = 1;
pub const RESPONSE_SEND_INPUT: u8 = 2;
pub const RESPONSE_REJECTED: u8 = 3;
pub const RESPONSE_OUTPUT: u8 = 4;
pub const RESPONSE_OUTPUT_END: u8 = 5;
pub const RESPONSE_ESC_SEQUENCE: u8 = 6;
pub const RESPONSE_WAIT_USER_CONFIRM: u8 = 10;
pub const RESPONSE_LOCKED: u8 = 11;

/// Lowest byte of the device error range (`246..=255`).
pub const RESPONSE_ERROR_FLOOR: u8 = 246;

/// Classification of a byte seen while a command is awaiting its
/// acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlByte {
    /// Command accepted.
    Ok,
    /// The device wants more input.
    SendInput,
    /// The user rejected the action.
    Rejected,
    /// Start of a multi-byte output record.
    Output,
    /// End of an output record.
    OutputEnd,
    /// The next byte is literal.
    EscSequence,
    /// The device is waiting for physical user confirmation.
    WaitUserConfirm,
    /// The device is locked.
    Locked,
    /// A device-reported error code.
    Error(DeviceError),
    /// Anything outside the response alphabet.
    Unknown(u8),
}

/// Classify one response byte. Total: any byte outside the alphabet comes
/// back as [`ControlByte::Unknown`].
pub fn classify(byte: u8) -> ControlByte {
    match byte {
        RESPONSE_OK => ControlByte::Ok,
        RESPONSE_SEND_INPUT => ControlByte::SendInput,
        RESPONSE_REJECTED => ControlByte::Rejected,
        RESPONSE_OUTPUT => ControlByte::Output,
        RESPONSE_OUTPUT_END => ControlByte::OutputEnd,
        RESPONSE_ESC_SEQUENCE => ControlByte::EscSequence,
        RESPONSE_WAIT_USER_CONFIRM => ControlByte::WaitUserConfirm,
        RESPONSE_LOCKED => ControlByte::Locked,
        _ => match DeviceError::from_byte(byte) {
            Some(error) => ControlByte::Error(error),
            None => ControlByte::Unknown(byte),
        },
    }
}

/// True for bytes the device cannot transmit literally inside an output
/// record.
pub fn is_control_byte(byte: u8) -> bool {
    matches!(
        byte,
        RESPONSE_OK..=RESPONSE_ESC_SEQUENCE | RESPONSE_WAIT_USER_CONFIRM | RESPONSE_LOCKED
    ) || byte >= RESPONSE_ERROR_FLOOR
}

/// Frame `data` the way the device transmits an output record: `OUTPUT`,
/// then the payload with `ESC_SEQUENCE` in front of every control byte,
/// then `OUTPUT_END`.
///
/// The driver never escapes outbound data; this exists for simulators and
/// tests that speak the device side of the protocol.
pub fn escape_output(data: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(data.len() + 2);
    framed.push(RESPONSE_OUTPUT);
    for &byte in data {
        if is_control_byte(byte) {
            framed.push(RESPONSE_ESC_SEQUENCE);
        }
        framed.push(byte);
    }
    framed.push(RESPONSE_OUTPUT_END);
    framed
}
