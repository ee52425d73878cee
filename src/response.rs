use bytes::Bytes;

/// Successful outcome of a single command exchange.
///
/// Which variant comes back is decided by the device: short acknowledgements
/// arrive as a single status byte, larger results arrive as an output
/// record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Command accepted.
    Ok,
    /// The device wants more input before it can continue.
    SendInput,
    /// The user rejected the action on the device.
    Rejected,
    /// Collected payload of an output record.
    Output(Bytes),
}

impl Response {
    /// True for a plain `Ok` acknowledgement.
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok)
    }

    /// The output payload, if the device sent one.
    pub fn output(&self) -> Option<&Bytes> {
        match self {
            Response::Output(data) => Some(data),
            _ => None,
        }
    }

    /// Consume the response, keeping the output payload if there was one.
    pub fn into_output(self) -> Option<Bytes> {
        match self {
            Response::Output(data) => Some(data),
            _ => None,
        }
    }
}
