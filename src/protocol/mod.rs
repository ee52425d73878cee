//! Ryder wire protocol: the response byte alphabet and output-record
//! framing.
//!
//! Device-to-host traffic is a stream of response records: single status
//! bytes, or multi-byte output bracketed by `OUTPUT` and `OUTPUT_END` with
//! `ESC_SEQUENCE` escaping any control byte that has to travel literally.
//! Host-to-device traffic is opaque; the driver writes caller bytes as-is.

pub mod decoder;

// Re-export commonly used items
pub use decoder::{classify, escape_output, ControlByte};
