//! The driver task: protocol engine plus connection supervisor.
//!
//! Everything mutable lives here, owned by one task: the serial port, the
//! command queue and its in-flight head, the advisory lock queue, the
//! watchdog deadline, and the reconnect deadline. The public handle in
//! [`crate::driver`] feeds this task through a mailbox, so no state is ever
//! touched from two contexts at once.

use std::future;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::config::RyderConfig;
use crate::driver::{Event, ReplySender, Request};
use crate::error::RyderError;
use crate::lock::LockQueue;
use crate::protocol::decoder::{classify, ControlByte};
use crate::queue::{CommandEntry, CommandQueue, OutputStep};
use crate::response::Response;
use crate::transport::OpenPort;

/// A head that makes no inbound progress for this long is failed with
/// [`RyderError::Watchdog`].
pub(crate) const WATCHDOG_TIMEOUT: Duration = Duration::from_millis(5000);

/// Read chunks to minimize syscalls; at 115200 baud single-byte reads would
/// thrash the executor.
const READ_CHUNK_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    /// Nothing in flight.
    Idle,
    /// Head written to the wire, awaiting its first response byte.
    Sending,
    /// Inside an output record addressed to the head.
    Reading,
}

/// What woke the driver task up.
enum Tick {
    Request(Option<Request>),
    Read(std::io::Result<usize>),
    Watchdog,
    Reconnect,
}

pub(crate) struct Driver<O: OpenPort> {
    opener: O,
    path: String,
    config: RyderConfig,
    requests: mpsc::UnboundedReceiver<Request>,
    events: mpsc::UnboundedSender<Event>,

    port: Option<O::Port>,
    closing: bool,

    state: EngineState,
    /// In-flight head. `Some` exactly while `state != Idle`.
    head: Option<CommandEntry>,
    queue: CommandQueue,
    locks: LockQueue,

    /// Armed exactly while `state != Idle`.
    watchdog_at: Option<Instant>,
    /// Armed exactly while the port is closed and `closing` is false.
    reconnect_at: Option<Instant>,
}

impl<O: OpenPort> Driver<O> {
    pub(crate) fn new(
        opener: O,
        path: String,
        config: RyderConfig,
        requests: mpsc::UnboundedReceiver<Request>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            opener,
            path,
            config,
            requests,
            events,
            port: None,
            closing: false,
            state: EngineState::Idle,
            head: None,
            queue: CommandQueue::default(),
            locks: LockQueue::default(),
            watchdog_at: None,
            reconnect_at: None,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut read_buf = BytesMut::with_capacity(READ_CHUNK_CAPACITY);
        self.try_open().await;

        loop {
            let tick = tokio::select! {
                request = self.requests.recv() => Tick::Request(request),
                result = Self::read_chunk(self.port.as_mut(), &mut read_buf) => Tick::Read(result),
                _ = Self::sleep_until_opt(self.watchdog_at) => Tick::Watchdog,
                _ = Self::sleep_until_opt(self.reconnect_at) => Tick::Reconnect,
            };

            match tick {
                Tick::Request(Some(request)) => self.handle_request(request).await,
                Tick::Request(None) => {
                    // Every handle is gone; tear down like an explicit
                    // close and stop.
                    self.close();
                    break;
                }
                Tick::Read(Ok(0)) => self.port_gone(None),
                Tick::Read(Ok(_)) => {
                    let chunk = read_buf.split();
                    self.handle_data(&chunk).await;
                }
                Tick::Read(Err(error)) => self.port_gone(Some(error)),
                Tick::Watchdog => self.watchdog_expired().await,
                Tick::Reconnect => {
                    self.reconnect_at = None;
                    self.try_open().await;
                }
            }
        }
        tracing::debug!("driver task exited");
    }

    /// Read whatever is available, or park forever while the port is
    /// closed.
    async fn read_chunk(
        port: Option<&mut O::Port>,
        buf: &mut BytesMut,
    ) -> std::io::Result<usize> {
        match port {
            Some(port) => {
                // `split()` hands the filled prefix to the caller, so the
                // buffer must be replenished or it runs dry and reads
                // start reporting a bogus EOF.
                buf.reserve(READ_CHUNK_CAPACITY);
                port.read_buf(buf).await
            }
            None => future::pending().await,
        }
    }

    async fn sleep_until_opt(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => future::pending().await,
        }
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Send {
                data,
                prepend,
                reply,
            } => self.submit(data, prepend, reply).await,
            Request::Lock { waiter } => self.locks.acquire(waiter),
            Request::Unlock => self.locks.release(),
            Request::IsLocked { reply } => {
                let _ = reply.send(self.locks.locked());
            }
            Request::Open { path } => {
                if self.port.is_some() {
                    // Already open: no-op, even when the caller had a
                    // different port in mind.
                    tracing::debug!("open requested but the port is already open");
                } else {
                    if let Some(path) = path {
                        self.path = path;
                    }
                    self.closing = false;
                    self.try_open().await;
                }
            }
            Request::Close => self.close(),
            Request::Clear => self.clear(),
        }
    }

    async fn submit(&mut self, data: Vec<u8>, prepend: bool, reply: ReplySender) {
        if self.port.is_none() {
            let _ = reply.send(Err(RyderError::Disconnected));
            return;
        }
        let entry = CommandEntry::new(data, reply);
        if prepend {
            self.queue.push_front(entry);
        } else {
            self.queue.push_back(entry);
        }
        if self.state == EngineState::Idle {
            self.advance().await;
        }
    }

    /// Pop the next entry and put it on the wire. Loops so that a port
    /// found closed at the point of dequeue drains the queue one head at a
    /// time.
    async fn advance(&mut self) {
        while let Some(entry) = self.queue.pop_front() {
            let Some(port) = self.port.as_mut() else {
                entry.reject(RyderError::Disconnected);
                continue;
            };
            tracing::debug!("TX {} byte(s): {:02X?}", entry.data.len(), entry.data);
            match Self::write_all(port, &entry.data).await {
                Ok(()) => {
                    self.state = EngineState::Sending;
                    self.head = Some(entry);
                    self.arm_watchdog();
                    return;
                }
                Err(error) => {
                    entry.reject(RyderError::Disconnected);
                    self.port_gone(Some(error));
                    return;
                }
            }
        }
    }

    async fn write_all(port: &mut O::Port, data: &[u8]) -> std::io::Result<()> {
        port.write_all(data).await?;
        port.flush().await
    }

    /// Scan one inbound chunk to exhaustion. A single chunk may finish
    /// several exchanges: completing one advances the queue inline, so the
    /// remaining bytes are matched against the next head.
    async fn handle_data(&mut self, bytes: &[u8]) {
        tracing::trace!("RX {} byte(s): {:02X?}", bytes.len(), bytes);
        let mut offset = 0;
        while offset < bytes.len() {
            let byte = bytes[offset];
            offset += 1;
            match self.state {
                EngineState::Idle => {
                    // Nothing is in flight, so neither this byte nor the
                    // rest of the chunk can belong to anyone.
                    tracing::warn!(
                        "discarding {} unexpected byte(s) received while idle",
                        bytes.len() - offset + 1
                    );
                    return;
                }
                EngineState::Sending => self.sending_byte(byte).await,
                EngineState::Reading => self.reading_byte(byte).await,
            }
        }
        if self.state != EngineState::Idle {
            // Inbound progress; push the deadline out.
            self.arm_watchdog();
        }
    }

    async fn sending_byte(&mut self, byte: u8) {
        match classify(byte) {
            ControlByte::Ok => self.finish_head(Response::Ok).await,
            ControlByte::SendInput => self.finish_head(Response::SendInput).await,
            ControlByte::Rejected => self.finish_head(Response::Rejected).await,
            ControlByte::Output => {
                self.state = EngineState::Reading;
            }
            ControlByte::WaitUserConfirm => {
                tracing::debug!("device is waiting for user confirmation");
                self.emit(Event::WaitUserConfirm);
            }
            ControlByte::Locked => {
                tracing::warn!("device reported it is locked");
                self.emit(Event::Locked);
                if self.config.reject_on_locked {
                    self.disarm_watchdog();
                    self.state = EngineState::Idle;
                    if let Some(head) = self.head.take() {
                        head.reject(RyderError::Locked);
                    }
                    self.queue.fail_all(|| RyderError::Locked);
                }
            }
            ControlByte::Error(device_error) => {
                self.fail_head(RyderError::Device(device_error)).await;
            }
            ControlByte::OutputEnd | ControlByte::EscSequence | ControlByte::Unknown(_) => {
                self.fail_head(RyderError::UnknownResponse(byte)).await;
            }
        }
    }

    async fn reading_byte(&mut self, byte: u8) {
        let Some(head) = self.head.as_mut() else {
            // Cannot happen while the state invariant holds; resynchronize.
            self.state = EngineState::Idle;
            return;
        };
        match head.feed_output_byte(byte) {
            OutputStep::Consumed => {}
            OutputStep::Complete => {
                self.disarm_watchdog();
                self.state = EngineState::Idle;
                if let Some(head) = self.head.take() {
                    head.resolve_output();
                }
                self.advance().await;
            }
        }
    }

    async fn finish_head(&mut self, response: Response) {
        self.disarm_watchdog();
        self.state = EngineState::Idle;
        if let Some(head) = self.head.take() {
            head.resolve(response);
        }
        self.advance().await;
    }

    async fn fail_head(&mut self, error: RyderError) {
        self.disarm_watchdog();
        self.state = EngineState::Idle;
        if let Some(head) = self.head.take() {
            head.reject(error);
        }
        self.advance().await;
    }

    async fn watchdog_expired(&mut self) {
        tracing::warn!("watchdog expired with no response from the device");
        self.fail_head(RyderError::Watchdog).await;
    }

    fn try_open_sync(&mut self) -> bool {
        tracing::info!("opening serial port {}", self.path);
        match self.opener.open_port(&self.path, &self.config) {
            Ok(port) => {
                tracing::info!("serial port open");
                self.port = Some(port);
                self.reconnect_at = None;
                self.emit(Event::Open);
                true
            }
            Err(error) => {
                tracing::warn!("failed to open {}: {}", self.path, error);
                self.emit(Event::Failed);
                if !self.closing {
                    self.reconnect_at = Some(Instant::now() + self.config.reconnect_interval);
                }
                false
            }
        }
    }

    async fn try_open(&mut self) {
        if self.try_open_sync() && self.state == EngineState::Idle {
            // Anything queued while the port was away goes out now.
            self.advance().await;
        }
    }

    /// The serial link is gone: unexpected EOF, read failure, or write
    /// failure. Fails the in-flight head and everything queued behind it,
    /// reports, and starts reconnecting unless a deliberate close is in
    /// progress.
    fn port_gone(&mut self, error: Option<std::io::Error>) {
        if self.port.take().is_none() {
            return;
        }
        if let Some(error) = &error {
            tracing::error!("serial port error: {}", error);
            self.emit(Event::Error(error.to_string()));
        } else {
            tracing::info!("serial port closed");
        }
        self.disarm_watchdog();
        self.state = EngineState::Idle;
        if let Some(head) = self.head.take() {
            head.reject(RyderError::Disconnected);
        }
        self.queue.fail_all(|| RyderError::Disconnected);
        self.emit(Event::Close);
        if !self.closing {
            self.reconnect_at = Some(Instant::now() + self.config.reconnect_interval);
        }
    }

    /// Fail every pending exchange, return to idle, release every lock.
    fn clear(&mut self) {
        self.disarm_watchdog();
        self.state = EngineState::Idle;
        if let Some(head) = self.head.take() {
            head.reject(RyderError::Cleared);
        }
        self.queue.fail_all(|| RyderError::Cleared);
        self.locks.release_all();
    }

    /// Deliberate teardown. Idempotent.
    fn close(&mut self) {
        if self.closing && self.port.is_none() {
            return;
        }
        tracing::info!("closing driver");
        self.closing = true;
        self.clear();
        self.reconnect_at = None;
        if self.port.take().is_some() {
            self.emit(Event::Close);
        }
    }

    fn emit(&self, event: Event) {
        // Nobody listening is fine; events are advisory.
        let _ = self.events.send(event);
    }

    fn arm_watchdog(&mut self) {
        self.watchdog_at = Some(Instant::now() + WATCHDOG_TIMEOUT);
    }

    fn disarm_watchdog(&mut self) {
        self.watchdog_at = None;
    }
}
