//! Integration test: full loopback session SETUP → pre-buffer → PLAY →
//! frames → PAUSE → TEARDOWN.
//!
//! Starts the server on a fixed port against a temporary frame-store
//! asset, runs a client through the whole lifecycle, and verifies frame
//! ordering and reassembled payloads.

use std::time::{Duration, Instant};

use mjstream::store::FrameStoreWriter;
use mjstream::{Client, ClientConfig, Server, SessionState};

/// Fixed ports for integration tests. bind_addr must be explicit (no
/// port 0), and each test gets its own pair so they can run in parallel.
const TEST_BIND: &str = "127.0.0.1:18554";
const DATA_PORT: u16 = 26000;

const MISSING_BIND: &str = "127.0.0.1:18555";
const MISSING_DATA_PORT: u16 = 26001;

const FRAME_COUNT: u64 = 120;
const FRAME_BYTES: usize = 3000;

fn frame_byte(index: u64) -> u8 {
    (index % 251) as u8
}

fn write_asset(dir: &std::path::Path, name: &str) {
    let mut writer = FrameStoreWriter::create(dir.join(name)).expect("create asset");
    for index in 1..=FRAME_COUNT {
        // Multi-fragment payloads with a per-frame fill byte, so a frame
        // stitched from the wrong fragments is caught.
        writer
            .write_frame(&vec![frame_byte(index); FRAME_BYTES])
            .expect("write frame");
    }
    assert_eq!(writer.frames_written(), FRAME_COUNT);
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn full_session_lifecycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_asset(dir.path(), "movie.Mjpeg");

    let mut server = Server::new(TEST_BIND, dir.path());
    server.start().expect("server start");

    // Fast frame rate so the buffer fills quickly.
    let config = ClientConfig {
        frame_rate: 200,
        ..ClientConfig::default()
    };
    let client = Client::connect_with_config(TEST_BIND, DATA_PORT, "movie.Mjpeg", config)
        .expect("connect to server");

    client.setup().expect("setup");
    assert!(
        wait_until(Duration::from_secs(5), || client.state()
            == SessionState::Ready
            && client.session_id() != 0),
        "setup was not acknowledged"
    );
    assert!(
        (100_000..=999_999).contains(&client.session_id()),
        "session id out of range: {}",
        client.session_id()
    );
    assert_eq!(client.total_frames(), FRAME_COUNT);

    // Pre-buffering auto-plays; wait for the buffer to prime and then for
    // the watermark controller to fill it to capacity and pause the
    // sender.
    assert!(
        wait_until(Duration::from_secs(5), || client.queue_depth() >= 30),
        "pre-buffer never reached threshold (depth {})",
        client.queue_depth()
    );
    assert!(
        wait_until(Duration::from_secs(5), || client.wait_sender_stopped(
            Duration::from_millis(100)
        )),
        "sender never paused at the high watermark"
    );
    let full_depth = client.queue_depth();
    assert!(full_depth >= 30, "depth collapsed to {full_depth}");

    client.play().expect("play");
    assert_eq!(client.state(), SessionState::Playing);

    // Drain a few frames; indices must be strictly increasing and each
    // payload must reassemble to its original bytes.
    let mut last_index = 0u16;
    for _ in 0..10 {
        let frame = client.next_frame().expect("frame available");
        assert!(
            frame.index > last_index,
            "index {} not after {}",
            frame.index,
            last_index
        );
        assert_eq!(frame.payload.len(), FRAME_BYTES);
        assert!(
            frame
                .payload
                .iter()
                .all(|&b| b == frame_byte(u64::from(frame.index))),
            "frame {} payload corrupted",
            frame.index
        );
        last_index = frame.index;
    }

    client.pause();
    assert_eq!(client.state(), SessionState::Ready);

    client.teardown().expect("teardown");
    assert!(
        wait_until(Duration::from_secs(3), || client.teardown_acknowledged()),
        "teardown was not acknowledged"
    );
    assert_eq!(client.state(), SessionState::Init);

    server.stop();
}

#[test]
fn setup_of_missing_asset_leaves_client_in_init() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut server = Server::new(MISSING_BIND, dir.path());
    server.start().expect("server start");

    let client =
        Client::connect(MISSING_BIND, MISSING_DATA_PORT, "nope.Mjpeg").expect("connect to server");
    client.setup().expect("setup send");

    // The not-found reply must not advance the session.
    assert!(
        !wait_until(Duration::from_secs(1), || client.state()
            != SessionState::Init),
        "missing asset advanced the session to {:?}",
        client.state()
    );
    assert_eq!(client.session_id(), 0);
    assert_eq!(client.total_frames(), 0);

    server.stop();
}
