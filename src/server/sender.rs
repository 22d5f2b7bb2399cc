//! Per-session sender worker.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::fragment::fragment_frame;
use crate::store::FrameStore;
use crate::sync::Signal;

/// Everything a sender worker needs, cloned out of the session under its
/// connection thread before spawning.
pub(crate) struct SenderContext {
    pub session_id: u32,
    pub store: Arc<Mutex<FrameStore>>,
    pub socket: Arc<UdpSocket>,
    pub dest: SocketAddr,
    /// Per-session frame interval; doubles as the pacing timeout.
    pub interval: Duration,
    /// Delay between fragments of one frame.
    pub pacing: Duration,
    pub stop: Arc<Signal>,
}

pub(crate) fn spawn(ctx: SenderContext) -> JoinHandle<()> {
    thread::spawn(move || run(ctx))
}

/// Cadence-paced send loop, active only while the session is playing.
///
/// Each iteration waits on the stop signal with the frame interval as
/// timeout; the wait is the pacer. End-of-stream leaves the loop idling
/// (the session stays up until pause or teardown). Transport errors are
/// logged and the loop continues; nothing is retransmitted.
fn run(ctx: SenderContext) {
    tracing::debug!(
        session_id = ctx.session_id,
        dest = %ctx.dest,
        interval_ms = ctx.interval.as_millis() as u64,
        "sender worker started"
    );

    loop {
        if ctx.stop.wait_timeout(ctx.interval) {
            break;
        }

        let frame = match ctx.store.lock().next_frame() {
            Ok(Some(frame)) => frame,
            // End of stream: keep the session alive, just idle.
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(session_id = ctx.session_id, error = %e, "frame store read failed");
                continue;
            }
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        let packets = fragment_frame(&frame, timestamp);
        let fragments = packets.len();
        for packet in packets {
            // The stop signal must win against every send so teardown can
            // close the endpoint without racing an in-flight write.
            if ctx.stop.is_set() {
                tracing::debug!(session_id = ctx.session_id, "sender worker stopped mid-frame");
                return;
            }
            if let Err(e) = ctx.socket.send_to(&packet.encode(), ctx.dest) {
                tracing::warn!(session_id = ctx.session_id, error = %e, "data send failed");
            }
            thread::sleep(ctx.pacing);
        }

        tracing::trace!(
            session_id = ctx.session_id,
            frame = frame.index,
            bytes = frame.payload.len(),
            fragments,
            "frame sent"
        );
    }

    tracing::debug!(session_id = ctx.session_id, "sender worker stopped");
}
