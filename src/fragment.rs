//! Frame fragmentation (send path) and reassembly (receive path).
//!
//! A JPEG-encoded frame usually exceeds a safe datagram size, so the sender
//! splits it into ordered chunks of at most [`MAX_FRAGMENT`] bytes. Every
//! chunk carries the frame index as its sequence number; only the final
//! chunk sets the marker bit.
//!
//! The receive side runs without any reordering buffer or retransmission:
//! whatever the datagram channel loses, duplicates, or reorders is resolved
//! by discarding, never by waiting.

use crate::packet::DataPacket;
use crate::store::Frame;

/// Largest fragment payload, chosen to keep datagrams under a typical MTU.
pub const MAX_FRAGMENT: usize = 1400;

/// Split one frame into datagram-sized packets.
///
/// All packets share the frame index as sequence number; the marker bit is
/// set only on the last. An empty frame still yields one marker packet so
/// the receiver observes the frame boundary.
pub fn fragment_frame(frame: &Frame, timestamp: u32) -> Vec<DataPacket> {
    let payload = &frame.payload;
    if payload.is_empty() {
        return vec![DataPacket::new(frame.index, true, timestamp, Vec::new())];
    }

    let mut packets = Vec::with_capacity(payload.len().div_ceil(MAX_FRAGMENT));
    let mut offset = 0usize;
    while offset < payload.len() {
        let end = usize::min(offset + MAX_FRAGMENT, payload.len());
        let marker = end == payload.len();
        packets.push(DataPacket::new(
            frame.index,
            marker,
            timestamp,
            payload[offset..end].to_vec(),
        ));
        offset = end;
    }
    packets
}

/// Rebuilds frames from fragments on the receive side.
///
/// State is one accumulator keyed by the sequence number currently being
/// gathered, plus the highest frame index accepted so far:
///
/// - A fragment whose index is at or below the highest accepted frame is
///   discarded unconditionally (late duplicates are lost, never re-inserted).
/// - A fragment with a *different* sequence number than the one being
///   gathered resets the accumulator; an incomplete prior frame is silently
///   dropped with no partial delivery.
/// - The marker fragment completes the frame and advances the highest
///   accepted index.
#[derive(Debug, Default)]
pub struct Reassembler {
    gathering_seq: Option<u16>,
    accumulator: Vec<u8>,
    highest_accepted: u16,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest frame index delivered so far (0 before the first frame;
    /// frame indices start at 1).
    pub fn highest_accepted(&self) -> u16 {
        self.highest_accepted
    }

    /// Feed one received packet; returns a complete frame when the marker
    /// fragment closes it.
    pub fn push(&mut self, packet: DataPacket) -> Option<Frame> {
        if packet.sequence <= self.highest_accepted {
            tracing::trace!(
                seq = packet.sequence,
                highest = self.highest_accepted,
                "stale or duplicate fragment discarded"
            );
            return None;
        }

        if self.gathering_seq != Some(packet.sequence) {
            if !self.accumulator.is_empty() {
                tracing::debug!(
                    abandoned_seq = ?self.gathering_seq,
                    bytes = self.accumulator.len(),
                    "incomplete frame dropped"
                );
            }
            self.gathering_seq = Some(packet.sequence);
            self.accumulator.clear();
        }

        self.accumulator.extend_from_slice(&packet.payload);

        if !packet.marker {
            return None;
        }

        let frame = Frame {
            index: packet.sequence,
            payload: std::mem::take(&mut self.accumulator),
        };
        self.highest_accepted = packet.sequence;
        self.gathering_seq = None;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: u16, len: usize) -> Frame {
        Frame {
            index,
            payload: (0..len).map(|i| (i % 251) as u8).collect(),
        }
    }

    #[test]
    fn small_frame_single_marker_packet() {
        let f = frame(1, 300);
        let packets = fragment_frame(&f, 0);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].marker);
        assert_eq!(packets[0].sequence, 1);
        assert_eq!(packets[0].payload, f.payload);
    }

    #[test]
    fn three_kilobyte_frame_fragments_1400_1400_200() {
        let f = frame(5, 3000);
        let packets = fragment_frame(&f, 0);
        let sizes: Vec<usize> = packets.iter().map(|p| p.payload.len()).collect();
        let markers: Vec<bool> = packets.iter().map(|p| p.marker).collect();
        assert_eq!(sizes, vec![1400, 1400, 200]);
        assert_eq!(markers, vec![false, false, true]);
        assert!(packets.iter().all(|p| p.sequence == 5));
    }

    #[test]
    fn exact_multiple_of_fragment_size() {
        let f = frame(1, 2800);
        let packets = fragment_frame(&f, 0);
        assert_eq!(packets.len(), 2);
        assert!(packets[1].marker);
        assert!(!packets[0].marker);
    }

    #[test]
    fn empty_frame_still_marks_boundary() {
        let f = Frame {
            index: 3,
            payload: vec![],
        };
        let packets = fragment_frame(&f, 0);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].marker);
        assert!(packets[0].payload.is_empty());
    }

    #[test]
    fn reassembly_reconstructs_exact_payload() {
        for fragments in 1..=5usize {
            let f = frame(1, fragments * MAX_FRAGMENT - 7);
            let mut reassembler = Reassembler::new();
            let mut out = None;
            for packet in fragment_frame(&f, 0) {
                out = reassembler.push(packet);
            }
            let rebuilt = out.expect("marker fragment completes the frame");
            assert_eq!(rebuilt.payload, f.payload);
            assert_eq!(rebuilt.index, 1);
        }
    }

    #[test]
    fn stale_frame_discarded_at_packet_level() {
        let mut reassembler = Reassembler::new();
        for packet in fragment_frame(&frame(10, 100), 0) {
            reassembler.push(packet);
        }
        assert_eq!(reassembler.highest_accepted(), 10);

        // A fully reassembled frame with a lower index never surfaces.
        for packet in fragment_frame(&frame(7, 100), 0) {
            assert!(reassembler.push(packet).is_none());
        }
        assert_eq!(reassembler.highest_accepted(), 10);
    }

    #[test]
    fn duplicate_completed_frame_discarded() {
        let mut reassembler = Reassembler::new();
        let packets = fragment_frame(&frame(1, 100), 0);
        assert!(reassembler.push(packets[0].clone()).is_some());
        assert!(reassembler.push(packets[0].clone()).is_none());
    }

    #[test]
    fn lost_marker_drops_partial_frame_without_stalling() {
        let mut reassembler = Reassembler::new();

        // Frame 1 arrives without its marker fragment.
        let mut partial = fragment_frame(&frame(1, 3000), 0);
        partial.pop();
        for packet in partial {
            assert!(reassembler.push(packet).is_none());
        }

        // Frame 2 arrives complete; frame 1's bytes must not leak into it.
        let f2 = frame(2, 3000);
        let mut out = None;
        for packet in fragment_frame(&f2, 0) {
            out = reassembler.push(packet);
        }
        let rebuilt = out.unwrap();
        assert_eq!(rebuilt.index, 2);
        assert_eq!(rebuilt.payload, f2.payload);
    }
}
