use thiserror::Error;

/// Failure reported by the Ryder firmware as a single response byte.
///
/// The device counts error codes down from 255; everything in `246..=255`
/// maps to one of these.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    #[error("unknown command")]
    UnknownCommand,
    #[error("device is not initialized")]
    NotInitialized,
    #[error("device memory error")]
    MemoryError,
    #[error("app domain too long")]
    AppDomainTooLong,
    #[error("app domain invalid")]
    AppDomainInvalid,
    #[error("mnemonic too long")]
    MnemonicTooLong,
    #[error("mnemonic invalid")]
    MnemonicInvalid,
    #[error("failed to generate mnemonic")]
    GenerateMnemonic,
    #[error("user input timed out")]
    InputTimeout,
    #[error("not implemented")]
    NotImplemented,
}

impl DeviceError {
    /// Map a device error byte to its meaning, if it is a known code.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            255 => Some(Self::UnknownCommand),
            254 => Some(Self::NotInitialized),
            253 => Some(Self::MemoryError),
            252 => Some(Self::AppDomainTooLong),
            251 => Some(Self::AppDomainInvalid),
            250 => Some(Self::MnemonicTooLong),
            249 => Some(Self::MnemonicInvalid),
            248 => Some(Self::GenerateMnemonic),
            247 => Some(Self::InputTimeout),
            246 => Some(Self::NotImplemented),
            _ => None,
        }
    }

    /// The wire byte the device sends for this error.
    pub fn byte(self) -> u8 {
        match self {
            Self::UnknownCommand => 255,
            Self::NotInitialized => 254,
            Self::MemoryError => 253,
            Self::AppDomainTooLong => 252,
            Self::AppDomainInvalid => 251,
            Self::MnemonicTooLong => 250,
            Self::MnemonicInvalid => 249,
            Self::GenerateMnemonic => 248,
            Self::InputTimeout => 247,
            Self::NotImplemented => 246,
        }
    }
}

/// Main error type for Ryder driver operations
#[derive(Error, Debug)]
pub enum RyderError {
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device error: {0}")]
    Device(DeviceError),

    #[error("unrecognized response byte {0:#04x}")]
    UnknownResponse(u8),

    #[error("device is not connected")]
    Disconnected,

    #[error("no response from the device before the watchdog expired")]
    Watchdog,

    #[error("command was dropped because the queue was cleared")]
    Cleared,

    #[error("device is locked")]
    Locked,
}

/// Convenience Result type
pub type Result<T> = std::result::Result<T, RyderError>;
