//! Command opcodes understood by the Ryder firmware.
//!
//! The driver treats these as opaque bytes: what a command does on the
//! device, and what input it expects after a `SendInput` response, is
//! defined by the firmware.

// Power and identity
pub const WAKE: u8 = 1;
pub const INFO: u8 = 2;

// Wallet lifecycle
pub const SETUP: u8 = 10;
pub const RESTORE_FROM_SEED: u8 = 11;
pub const RESTORE_FROM_MNEMONIC: u8 = 12;
pub const ERASE: u8 = 13;

// Key export
pub const EXPORT_OWNER_KEY: u8 = 18;
pub const EXPORT_OWNER_KEY_PRIVATE_KEY: u8 = 19;
pub const EXPORT_APP_KEY: u8 = 20;
pub const EXPORT_APP_KEY_PRIVATE_KEY: u8 = 21;
pub const EXPORT_OWNER_APP_KEY_PRIVATE_KEY: u8 = 23;
pub const EXPORT_PUBLIC_IDENTITIES: u8 = 30;
pub const EXPORT_PUBLIC_IDENTITY: u8 = 31;

// Encryption sessions
pub const START_ENCRYPT: u8 = 40;
pub const START_DECRYPT: u8 = 41;

// Abort whatever the device is currently doing
pub const CANCEL: u8 = 100;
