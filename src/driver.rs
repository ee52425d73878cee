//! Public driver handle.

use std::future::Future;
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};

use crate::config::RyderConfig;
use crate::engine::Driver;
use crate::error::{Result, RyderError};
use crate::response::Response;
use crate::transport::{NativeSerial, OpenPort};

/// Observer events emitted by the driver, delivered in the order they were
/// generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The serial port is open.
    Open,
    /// The serial port closed.
    Close,
    /// A connection attempt failed; another follows while the driver is not
    /// closing.
    Failed,
    /// Transport-level error on the open port.
    Error(String),
    /// The device reported it is locked.
    Locked,
    /// The device is waiting for the user to confirm on the hardware.
    WaitUserConfirm,
}

pub(crate) type ReplySender = oneshot::Sender<Result<Response>>;

pub(crate) enum Request {
    Send {
        data: Vec<u8>,
        prepend: bool,
        reply: ReplySender,
    },
    Lock {
        waiter: oneshot::Sender<()>,
    },
    Unlock,
    IsLocked {
        reply: oneshot::Sender<bool>,
    },
    Open {
        path: Option<String>,
    },
    Close,
    Clear,
}

/// Handle to a Ryder device driver.
///
/// All mutable state (the port, the command queue with its in-flight head,
/// the advisory locks, the timers) lives in a single background task; this
/// handle is the mailbox into it. Commands submitted through
/// [`send`](Self::send) reach the wire strictly in submission order and are
/// matched to device responses one exchange at a time.
///
/// # Example
///
/// ```no_run
/// use ryder_serial::{commands, RyderConfig, RyderSerial};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let ryder = RyderSerial::connect("/dev/ttyUSB0", RyderConfig::default());
/// let info = ryder.send_command(commands::INFO).await?;
/// println!("device info: {:?}", info);
/// # Ok(())
/// # }
/// ```
pub struct RyderSerial {
    requests: mpsc::UnboundedSender<Request>,
    events: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
}

impl RyderSerial {
    /// Connect to the Ryder device on `path`.
    ///
    /// The connection is established, and re-established after drops, in
    /// the background; subscribe via
    /// [`take_event_receiver`](Self::take_event_receiver) to observe
    /// progress. Must be called from within a tokio runtime.
    pub fn connect(path: impl Into<String>, config: RyderConfig) -> Self {
        Self::connect_with(NativeSerial, path, config)
    }

    /// Connect through a custom transport factory. This is how tests and
    /// simulator harnesses substitute the serial link.
    pub fn connect_with<O: OpenPort>(
        opener: O,
        path: impl Into<String>,
        config: RyderConfig,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let driver = Driver::new(opener, path.into(), config, request_rx, event_tx);
        tokio::spawn(driver.run());
        Self {
            requests: request_tx,
            events: Mutex::new(Some(event_rx)),
        }
    }

    /// Submit `data` as one command exchange and wait for the device's
    /// response.
    ///
    /// Fails with [`RyderError::Disconnected`] right away when the port is
    /// not open.
    pub async fn send(&self, data: impl Into<Vec<u8>>) -> Result<Response> {
        self.submit(data.into(), false).await
    }

    /// Single-opcode convenience for [`send`](Self::send).
    pub async fn send_command(&self, opcode: u8) -> Result<Response> {
        self.submit(vec![opcode], false).await
    }

    /// Like [`send`](Self::send), but the exchange jumps ahead of every
    /// queued, not yet in-flight, exchange. Used to put
    /// [`CANCEL`](crate::commands::CANCEL) in front of pending work.
    pub async fn send_prepend(&self, data: impl Into<Vec<u8>>) -> Result<Response> {
        self.submit(data.into(), true).await
    }

    async fn submit(&self, data: Vec<u8>, prepend: bool) -> Result<Response> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(Request::Send {
            data,
            prepend,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| RyderError::Disconnected)?
    }

    /// Reserve the channel. Resolves immediately when nobody holds the
    /// lock, otherwise waits for the matching release.
    ///
    /// Locks are purely advisory: they serialize cooperating callers, not
    /// wire writes.
    pub async fn lock(&self) -> Result<()> {
        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.request(Request::Lock { waiter: waiter_tx })?;
        waiter_rx.await.map_err(|_| RyderError::Disconnected)
    }

    /// Release one lock acquisition, waking the next waiter in line.
    pub fn unlock(&self) {
        let _ = self.request(Request::Unlock);
    }

    /// Run `callback` with the channel reserved, releasing afterwards no
    /// matter how the callback came out.
    pub async fn sequence<F, Fut, T>(&self, callback: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.lock().await?;
        let result = callback().await;
        self.unlock();
        result
    }

    /// Whether any lock acquisition is outstanding.
    pub async fn locked(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.request(Request::IsLocked { reply: reply_tx }).is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Re-open the serial port after a [`close`](Self::close). No-op while
    /// the port is already open.
    pub fn open(&self) {
        let _ = self.request(Request::Open { path: None });
    }

    /// Like [`open`](Self::open), but target `path` instead of the port the
    /// driver last used. Ignored, like any open, while the port is already
    /// open.
    pub fn open_on(&self, path: impl Into<String>) {
        let _ = self.request(Request::Open {
            path: Some(path.into()),
        });
    }

    /// Tear down: fail pending exchanges with [`RyderError::Cleared`],
    /// release all locks, close the port, stop reconnecting. Idempotent.
    pub fn close(&self) {
        let _ = self.request(Request::Close);
    }

    /// Fail every pending exchange with [`RyderError::Cleared`] and release
    /// every outstanding lock, leaving the connection as it is.
    pub fn clear(&self) {
        let _ = self.request(Request::Clear);
    }

    /// Take ownership of the observer event stream.
    ///
    /// Can only be called once; later calls return `None`.
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<Event>> {
        self.events.lock().unwrap().take()
    }

    fn request(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| RyderError::Disconnected)
    }
}
