use std::collections::VecDeque;

use bytes::{BufMut, BytesMut};
use tokio::sync::oneshot;

use crate::error::{Result, RyderError};
use crate::protocol::decoder::{RESPONSE_ESC_SEQUENCE, RESPONSE_OUTPUT_END};
use crate::response::Response;

/// What happened to one byte fed into an open output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputStep {
    /// Byte consumed; the record is still open.
    Consumed,
    /// The record just terminated; the accumulated payload is complete.
    Complete,
}

/// One queued command exchange.
///
/// The completion channel doubles as resolver and rejecter: sending consumes
/// it, so exactly one outcome can ever be delivered. The escape flag and
/// output buffer live here rather than on the engine so that queue
/// manipulation can never corrupt an exchange in progress.
#[derive(Debug)]
pub(crate) struct CommandEntry {
    pub data: Vec<u8>,
    reply: oneshot::Sender<Result<Response>>,
    esc_pending: bool,
    output: BytesMut,
}

impl CommandEntry {
    pub fn new(data: Vec<u8>, reply: oneshot::Sender<Result<Response>>) -> Self {
        Self {
            data,
            reply,
            esc_pending: false,
            output: BytesMut::new(),
        }
    }

    /// Feed one byte of an open output record.
    ///
    /// An unescaped `ESC_SEQUENCE` makes the next byte literal; an
    /// unescaped `OUTPUT_END` terminates the record.
    pub fn feed_output_byte(&mut self, byte: u8) -> OutputStep {
        if self.esc_pending {
            self.esc_pending = false;
            self.output.put_u8(byte);
            OutputStep::Consumed
        } else if byte == RESPONSE_ESC_SEQUENCE {
            self.esc_pending = true;
            OutputStep::Consumed
        } else if byte == RESPONSE_OUTPUT_END {
            OutputStep::Complete
        } else {
            self.output.put_u8(byte);
            OutputStep::Consumed
        }
    }

    /// Resolve with the accumulated output payload.
    pub fn resolve_output(mut self) {
        let payload = self.output.split().freeze();
        let _ = self.reply.send(Ok(Response::Output(payload)));
    }

    pub fn resolve(self, response: Response) {
        // The caller may have given up on the exchange; nothing to do then.
        let _ = self.reply.send(Ok(response));
    }

    pub fn reject(self, error: RyderError) {
        let _ = self.reply.send(Err(error));
    }
}

/// FIFO of pending command exchanges.
#[derive(Debug, Default)]
pub(crate) struct CommandQueue {
    entries: VecDeque<CommandEntry>,
}

impl CommandQueue {
    pub fn push_back(&mut self, entry: CommandEntry) {
        self.entries.push_back(entry);
    }

    /// Insert ahead of every waiting entry. The in-flight head lives
    /// outside the queue, so a prepend can never displace it.
    pub fn push_front(&mut self, entry: CommandEntry) {
        self.entries.push_front(entry);
    }

    pub fn pop_front(&mut self) -> Option<CommandEntry> {
        self.entries.pop_front()
    }

    /// Drain the queue, rejecting every entry.
    pub fn fail_all(&mut self, error: impl Fn() -> RyderError) {
        for entry in self.entries.drain(..) {
            entry.reject(error());
        }
    }
}
