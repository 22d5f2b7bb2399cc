//! Datagram receive worker: reassembly plus the adaptive buffer
//! controller.

use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::buffer::FlowAction;
use crate::fragment::Reassembler;
use crate::packet::DataPacket;
use crate::protocol::Method;
use crate::session::SessionState;

use super::ClientInner;

/// Receive loop. Runs until teardown is acknowledged or the socket dies.
///
/// Before each receive the watermark policy is evaluated against the
/// current queue depth, so flow-control requests go out even while no
/// packets are arriving.
pub(super) fn run(inner: Arc<ClientInner>, socket: Arc<UdpSocket>) {
    tracing::debug!("receiver worker started");
    let mut reassembler = Reassembler::new();
    let mut buf = vec![0u8; 65_535];

    loop {
        apply_flow_control(&inner);

        let n = match socket.recv_from(&mut buf) {
            Ok((n, _)) => n,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if inner.teardown_acked.load(Ordering::SeqCst) {
                    break;
                }
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "data socket read failed");
                break;
            }
        };

        let packet = match DataPacket::decode(&buf[..n]) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(error = %e, "undecodable datagram dropped");
                continue;
            }
        };

        if let Some(frame) = reassembler.push(packet) {
            tracing::trace!(index = frame.index, bytes = frame.payload.len(), "frame buffered");
            inner.queue.push(frame);
        }
    }

    inner.receiver_running.store(false, Ordering::SeqCst);
    tracing::debug!("receiver worker exited");
}

/// Evaluate the watermark policy and fire at most one control request.
fn apply_flow_control(inner: &Arc<ClientInner>) {
    let depth = inner.queue.depth();
    let last = *inner.last_request.lock();
    if last == Some(Method::Teardown) {
        // The session is winding down; any further control traffic would
        // desync reply correlation.
        return;
    }
    let pre_buffering = inner.pre_buffering.load(Ordering::SeqCst);

    let Some(action) = inner.config.policy.assess(depth, last, pre_buffering) else {
        return;
    };

    match action {
        FlowAction::Pause => {
            if pre_buffering {
                // The buffer is primed: freeze playback state until the
                // user hits play, and fall through to pause the sender.
                inner.pre_buffering.store(false, Ordering::SeqCst);
                *inner.state.lock() = SessionState::Ready;
                tracing::info!(depth, "pre-buffer threshold reached");
            } else {
                tracing::debug!(depth, "buffer full; pausing sender");
            }
            if let Err(e) = inner.send_request(Method::Pause) {
                tracing::warn!(error = %e, "pause request failed");
            }
        }
        FlowAction::Resume => {
            tracing::debug!(depth, "buffer drained; resuming sender");
            if let Err(e) = inner.send_request(Method::Play) {
                tracing::warn!(error = %e, "resume request failed");
            }
        }
    }
}
