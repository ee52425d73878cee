// Integration tests for the driver task, run against an in-memory serial
// link with paused time so watchdog and reconnect behavior is
// deterministic.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use ryder_serial::commands;
use ryder_serial::protocol::escape_output;
use ryder_serial::transport::OpenPort;
use ryder_serial::{Event, Response, RyderConfig, RyderError, RyderSerial};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;

/// Transport factory that hands the driver pre-built in-memory streams.
/// Each `Some` is a successful open, each `None` a failed attempt. Every
/// attempted path is recorded.
struct MockSerial {
    attempts: Arc<Mutex<VecDeque<Option<DuplexStream>>>>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl MockSerial {
    /// One port that opens on the first attempt; returns the device side.
    fn single() -> (Self, DuplexStream) {
        let (driver_side, device_side) = tokio::io::duplex(4096);
        (Self::scripted(vec![Some(driver_side)]), device_side)
    }

    fn scripted(attempts: Vec<Option<DuplexStream>>) -> Self {
        Self {
            attempts: Arc::new(Mutex::new(attempts.into())),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl OpenPort for MockSerial {
    type Port = DuplexStream;

    fn open_port(
        &mut self,
        path: &str,
        _config: &RyderConfig,
    ) -> ryder_serial::Result<DuplexStream> {
        self.opened.lock().unwrap().push(path.to_string());
        match self.attempts.lock().unwrap().pop_front() {
            Some(Some(stream)) => Ok(stream),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, "no such port").into()),
        }
    }
}

async fn wait_for_open(events: &mut UnboundedReceiver<Event>) {
    loop {
        match events.recv().await {
            Some(Event::Open) => return,
            Some(_) => continue,
            None => panic!("event channel closed before the port opened"),
        }
    }
}

async fn read_exact(device: &mut DuplexStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    device.read_exact(&mut buf).await.unwrap();
    buf
}

#[tokio::test(start_paused = true)]
async fn info_resolves_with_ok() {
    let (opener, mut device) = MockSerial::single();
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());
    let mut events = ryder.take_event_receiver().unwrap();
    wait_for_open(&mut events).await;

    let (sent, _) = tokio::join!(ryder.send_command(commands::INFO), async {
        assert_eq!(read_exact(&mut device, 1).await, [commands::INFO]);
        device.write_all(&[1]).await.unwrap();
    });
    assert_eq!(sent.unwrap(), Response::Ok);
}

#[tokio::test(start_paused = true)]
async fn output_record_unescapes() {
    let (opener, mut device) = MockSerial::single();
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());

    let (sent, _) = tokio::join!(ryder.send_command(commands::EXPORT_PUBLIC_IDENTITIES), async {
        assert_eq!(
            read_exact(&mut device, 1).await,
            [commands::EXPORT_PUBLIC_IDENTITIES]
        );
        // 0x06 escapes the first 0x05; the second 0x05 terminates.
        device.write_all(&[4, 0xAA, 6, 5, 0xBB, 5]).await.unwrap();
    });
    assert_eq!(
        sent.unwrap(),
        Response::Output(Bytes::from_static(&[0xAA, 0x05, 0xBB]))
    );
}

#[tokio::test(start_paused = true)]
async fn pipelined_responses_in_one_buffer() {
    let (opener, mut device) = MockSerial::single();
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());

    let (a, b, _) = tokio::join!(
        ryder.send_command(commands::INFO),
        ryder.send_command(commands::WAKE),
        async {
            assert_eq!(read_exact(&mut device, 1).await, [commands::INFO]);
            // Both acknowledgements pipelined into one chunk.
            device.write_all(&[1, 2]).await.unwrap();
            // The second command only hits the wire after the first
            // resolved.
            assert_eq!(read_exact(&mut device, 1).await, [commands::WAKE]);
        }
    );
    assert_eq!(a.unwrap(), Response::Ok);
    assert_eq!(b.unwrap(), Response::SendInput);
}

#[tokio::test(start_paused = true)]
async fn user_confirm_then_output() {
    let (opener, mut device) = MockSerial::single();
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());
    let mut events = ryder.take_event_receiver().unwrap();
    wait_for_open(&mut events).await;

    let (sent, _) = tokio::join!(ryder.send_command(commands::START_ENCRYPT), async {
        read_exact(&mut device, 1).await;
        device.write_all(&[10]).await.unwrap();
        time::sleep(Duration::from_millis(50)).await;
        device.write_all(&[4, 0xDE, 0xAD, 5]).await.unwrap();
    });
    assert_eq!(
        sent.unwrap(),
        Response::Output(Bytes::from_static(&[0xDE, 0xAD]))
    );
    assert_eq!(events.recv().await, Some(Event::WaitUserConfirm));
}

#[tokio::test(start_paused = true)]
async fn watchdog_fails_a_silent_exchange() {
    let (opener, mut device) = MockSerial::single();
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());

    let (sent, _) = tokio::join!(ryder.send_command(commands::SETUP), async {
        // Swallow the command and go silent; paused time fast-forwards to
        // the watchdog deadline.
        read_exact(&mut device, 1).await;
    });
    assert!(matches!(sent, Err(RyderError::Watchdog)));

    // The engine is idle again; the next exchange runs normally.
    let (sent, _) = tokio::join!(ryder.send_command(commands::INFO), async {
        read_exact(&mut device, 1).await;
        device.write_all(&[1]).await.unwrap();
    });
    assert_eq!(sent.unwrap(), Response::Ok);
}

#[tokio::test(start_paused = true)]
async fn locked_fails_everything_under_strict_policy() {
    let (opener, mut device) = MockSerial::single();
    let config = RyderConfig {
        reject_on_locked: true,
        ..RyderConfig::default()
    };
    let ryder = RyderSerial::connect_with(opener, "mock", config);
    let mut events = ryder.take_event_receiver().unwrap();
    wait_for_open(&mut events).await;

    let (a, b, c, _) = tokio::join!(
        ryder.send_command(commands::SETUP),
        ryder.send_command(commands::INFO),
        ryder.send_command(commands::WAKE),
        async {
            // Only the first command reaches the wire.
            assert_eq!(read_exact(&mut device, 1).await, [commands::SETUP]);
            device.write_all(&[11]).await.unwrap();
        }
    );
    assert!(matches!(a, Err(RyderError::Locked)));
    assert!(matches!(b, Err(RyderError::Locked)));
    assert!(matches!(c, Err(RyderError::Locked)));

    assert_eq!(events.recv().await, Some(Event::Locked));
    // Exactly one locked event for the one LOCKED byte.
    assert!(time::timeout(Duration::from_millis(10), events.recv())
        .await
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn locked_is_advisory_under_permissive_policy() {
    let (opener, mut device) = MockSerial::single();
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());
    let mut events = ryder.take_event_receiver().unwrap();
    wait_for_open(&mut events).await;

    let (sent, _) = tokio::join!(ryder.send_command(commands::INFO), async {
        read_exact(&mut device, 1).await;
        // LOCKED mid-buffer does not disturb the exchange.
        device.write_all(&[11, 1]).await.unwrap();
    });
    assert_eq!(sent.unwrap(), Response::Ok);
    assert_eq!(events.recv().await, Some(Event::Locked));
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_unexpected_close() {
    let (driver_a, device_a) = tokio::io::duplex(4096);
    let (driver_b, _device_b) = tokio::io::duplex(4096);
    let opener = MockSerial::scripted(vec![Some(driver_a), None, Some(driver_b)]);
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());
    let mut events = ryder.take_event_receiver().unwrap();
    assert_eq!(events.recv().await, Some(Event::Open));

    // The port goes away underneath the driver.
    drop(device_a);
    assert_eq!(events.recv().await, Some(Event::Close));

    // Submissions while disconnected fail straight away.
    assert!(matches!(
        ryder.send_command(commands::INFO).await,
        Err(RyderError::Disconnected)
    ));

    // First retry fails, the one after succeeds, one interval apart.
    assert_eq!(events.recv().await, Some(Event::Failed));
    assert_eq!(events.recv().await, Some(Event::Open));
}

#[tokio::test(start_paused = true)]
async fn device_error_byte_fails_the_head() {
    let (opener, mut device) = MockSerial::single();
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());

    let (sent, _) = tokio::join!(ryder.send_command(commands::EXPORT_OWNER_KEY), async {
        read_exact(&mut device, 1).await;
        device.write_all(&[254]).await.unwrap();
    });
    assert!(matches!(
        sent,
        Err(RyderError::Device(
            ryder_serial::DeviceError::NotInitialized
        ))
    ));
}

#[tokio::test(start_paused = true)]
async fn unrecognized_byte_fails_the_head() {
    let (opener, mut device) = MockSerial::single();
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());

    let (sent, _) = tokio::join!(ryder.send_command(commands::INFO), async {
        read_exact(&mut device, 1).await;
        device.write_all(&[0x42]).await.unwrap();
    });
    assert!(matches!(sent, Err(RyderError::UnknownResponse(0x42))));
}

#[tokio::test(start_paused = true)]
async fn chunk_boundaries_do_not_change_outcomes() {
    let payload: Vec<u8> = vec![0x01, 0x06, 0x05, 0x04, 0xFF, 0x00, 0x0A, 0xFB];
    let stream = escape_output(&payload);

    for split in 0..=stream.len() {
        let (opener, mut device) = MockSerial::single();
        let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());
        let (first, second) = stream.split_at(split);

        let (sent, _) = tokio::join!(ryder.send_command(commands::EXPORT_PUBLIC_IDENTITY), async {
            read_exact(&mut device, 1).await;
            if !first.is_empty() {
                device.write_all(first).await.unwrap();
                // Give the driver a beat so the halves arrive as separate
                // reads.
                time::sleep(Duration::from_millis(1)).await;
            }
            if !second.is_empty() {
                device.write_all(second).await.unwrap();
            }
        });
        assert_eq!(
            sent.unwrap(),
            Response::Output(Bytes::copy_from_slice(&payload)),
            "split at {split}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn sustained_traffic_does_not_wedge_the_connection() {
    let (opener, mut device) = MockSerial::single();
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());
    let mut events = ryder.take_event_receiver().unwrap();
    wait_for_open(&mut events).await;

    // Well past the driver's read chunk size in cumulative inbound bytes
    // over one connection.
    let payload: Vec<u8> = (0..600).map(|i| (i % 256) as u8).collect();
    let record = escape_output(&payload);
    for round in 0..8 {
        let (sent, _) = tokio::join!(ryder.send_command(commands::EXPORT_PUBLIC_IDENTITIES), async {
            read_exact(&mut device, 1).await;
            device.write_all(&record).await.unwrap();
        });
        assert_eq!(
            sent.unwrap(),
            Response::Output(Bytes::copy_from_slice(&payload)),
            "round {round}"
        );
    }

    // The port never flapped: no Close/Failed/Error along the way.
    assert!(time::timeout(Duration::from_millis(10), events.recv())
        .await
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn reopen_can_target_a_different_port() {
    let (driver_a, _device_a) = tokio::io::duplex(4096);
    let (driver_b, mut device_b) = tokio::io::duplex(4096);
    let opener = MockSerial::scripted(vec![Some(driver_a), Some(driver_b)]);
    let paths = opener.opened.clone();
    let ryder = RyderSerial::connect_with(opener, "mock-a", RyderConfig::default());
    let mut events = ryder.take_event_receiver().unwrap();
    assert_eq!(events.recv().await, Some(Event::Open));

    ryder.close();
    assert_eq!(events.recv().await, Some(Event::Close));

    ryder.open_on("mock-b");
    assert_eq!(events.recv().await, Some(Event::Open));
    assert_eq!(*paths.lock().unwrap(), ["mock-a", "mock-b"]);

    let (sent, _) = tokio::join!(ryder.send_command(commands::INFO), async {
        read_exact(&mut device_b, 1).await;
        device_b.write_all(&[1]).await.unwrap();
    });
    assert_eq!(sent.unwrap(), Response::Ok);
}

#[tokio::test(start_paused = true)]
async fn prepend_jumps_the_queue_without_displacing_the_head() {
    let (opener, mut device) = MockSerial::single();
    let ryder = Arc::new(RyderSerial::connect_with(
        opener,
        "mock",
        RyderConfig::default(),
    ));

    let a = tokio::spawn({
        let ryder = ryder.clone();
        async move { ryder.send_command(commands::SETUP).await }
    });
    // The first command is in flight before anything else is queued.
    assert_eq!(read_exact(&mut device, 1).await, [commands::SETUP]);

    let b = tokio::spawn({
        let ryder = ryder.clone();
        async move { ryder.send_command(commands::INFO).await }
    });
    time::sleep(Duration::from_millis(1)).await;
    let c = tokio::spawn({
        let ryder = ryder.clone();
        async move { ryder.send_prepend([commands::CANCEL]).await }
    });
    // Paused time only advances once every task is idle, so both
    // submissions are queued before the head completes.
    time::sleep(Duration::from_millis(1)).await;

    // Completing the head serves the prepended command first.
    device.write_all(&[1]).await.unwrap();
    assert_eq!(read_exact(&mut device, 1).await, [commands::CANCEL]);
    device.write_all(&[1]).await.unwrap();
    assert_eq!(read_exact(&mut device, 1).await, [commands::INFO]);
    device.write_all(&[2]).await.unwrap();

    assert_eq!(a.await.unwrap().unwrap(), Response::Ok);
    assert_eq!(c.await.unwrap().unwrap(), Response::Ok);
    assert_eq!(b.await.unwrap().unwrap(), Response::SendInput);
}

#[tokio::test(start_paused = true)]
async fn clear_fails_pending_exchanges() {
    let (opener, mut device) = MockSerial::single();
    let ryder = Arc::new(RyderSerial::connect_with(
        opener,
        "mock",
        RyderConfig::default(),
    ));

    let a = tokio::spawn({
        let ryder = ryder.clone();
        async move { ryder.send_command(commands::SETUP).await }
    });
    assert_eq!(read_exact(&mut device, 1).await, [commands::SETUP]);
    let b = tokio::spawn({
        let ryder = ryder.clone();
        async move { ryder.send_command(commands::INFO).await }
    });
    time::sleep(Duration::from_millis(1)).await;

    ryder.clear();
    assert!(matches!(a.await.unwrap(), Err(RyderError::Cleared)));
    assert!(matches!(b.await.unwrap(), Err(RyderError::Cleared)));

    // The driver still works afterwards.
    let (sent, _) = tokio::join!(ryder.send_command(commands::INFO), async {
        read_exact(&mut device, 1).await;
        device.write_all(&[1]).await.unwrap();
    });
    assert_eq!(sent.unwrap(), Response::Ok);
}

#[tokio::test(start_paused = true)]
async fn bytes_while_idle_are_discarded() {
    let (opener, mut device) = MockSerial::single();
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());

    device.write_all(&[1, 2, 3]).await.unwrap();
    time::sleep(Duration::from_millis(1)).await;

    // The stray bytes were dropped; a real exchange is unaffected.
    let (sent, _) = tokio::join!(ryder.send_command(commands::INFO), async {
        read_exact(&mut device, 1).await;
        device.write_all(&[1]).await.unwrap();
    });
    assert_eq!(sent.unwrap(), Response::Ok);
}

#[tokio::test(start_paused = true)]
async fn locks_release_in_fifo_order() {
    let (opener, _device) = MockSerial::single();
    let ryder = Arc::new(RyderSerial::connect_with(
        opener,
        "mock",
        RyderConfig::default(),
    ));

    assert!(!ryder.locked().await);
    ryder.lock().await.unwrap();
    assert!(ryder.locked().await);

    let second = tokio::spawn({
        let ryder = ryder.clone();
        async move { ryder.lock().await }
    });
    time::sleep(Duration::from_millis(1)).await;
    let third = tokio::spawn({
        let ryder = ryder.clone();
        async move { ryder.lock().await }
    });
    time::sleep(Duration::from_millis(1)).await;

    ryder.unlock();
    second.await.unwrap().unwrap();
    assert!(ryder.locked().await);

    ryder.unlock();
    third.await.unwrap().unwrap();

    ryder.unlock();
    assert!(!ryder.locked().await);
}

#[tokio::test(start_paused = true)]
async fn sequence_releases_the_lock_either_way() {
    let (opener, mut device) = MockSerial::single();
    let ryder = Arc::new(RyderSerial::connect_with(
        opener,
        "mock",
        RyderConfig::default(),
    ));

    let inner = ryder.clone();
    let (result, _) = tokio::join!(
        ryder.sequence(|| {
            let ryder = inner.clone();
            async move {
                assert!(ryder.locked().await);
                ryder.send_command(commands::INFO).await
            }
        }),
        async {
            read_exact(&mut device, 1).await;
            device.write_all(&[1]).await.unwrap();
        }
    );
    assert_eq!(result.unwrap(), Response::Ok);
    assert!(!ryder.locked().await);

    // A failing callback releases too.
    let failed: ryder_serial::Result<()> = ryder
        .sequence(|| async { Err(RyderError::Cleared) })
        .await;
    assert!(failed.is_err());
    assert!(!ryder.locked().await);
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent_and_reopen_works() {
    let (driver_a, _device_a) = tokio::io::duplex(4096);
    let (driver_b, mut device_b) = tokio::io::duplex(4096);
    let opener = MockSerial::scripted(vec![Some(driver_a), Some(driver_b)]);
    let ryder = RyderSerial::connect_with(opener, "mock", RyderConfig::default());
    let mut events = ryder.take_event_receiver().unwrap();
    assert_eq!(events.recv().await, Some(Event::Open));

    ryder.close();
    ryder.close();
    assert_eq!(events.recv().await, Some(Event::Close));
    assert!(matches!(
        ryder.send_command(commands::INFO).await,
        Err(RyderError::Disconnected)
    ));

    ryder.open();
    assert_eq!(events.recv().await, Some(Event::Open));
    let (sent, _) = tokio::join!(ryder.send_command(commands::INFO), async {
        read_exact(&mut device_b, 1).await;
        device_b.write_all(&[1]).await.unwrap();
    });
    assert_eq!(sent.unwrap(), Response::Ok);
}
