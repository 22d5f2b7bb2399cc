//! Playback queue and watermark flow control.
//!
//! The client enqueues reassembled frames faster than it consumes them, so
//! a watermark policy paces the server: a high watermark pauses the sender,
//! a lower resume threshold restarts it, and the gap between the two keeps
//! the control channel from oscillating. Right after setup a smaller
//! pre-buffer threshold pauses the sender once enough frames have arrived
//! for a smooth playback start.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::protocol::Method;
use crate::store::Frame;

/// Default high watermark: pause the sender at this queue depth.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default hysteresis margin: resume once depth falls below
/// `capacity - margin`.
pub const DEFAULT_MARGIN: usize = 20;

/// Frames gathered before the initial auto-pause right after setup.
pub const DEFAULT_PREBUFFER_THRESHOLD: usize = 30;

/// FIFO of reassembled frames awaiting presentation.
///
/// Single producer (the receiver worker), single consumer (the playback
/// loop). Structurally unbounded; boundedness comes from the flow-control
/// loop pausing the sender.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    frames: Mutex<VecDeque<Frame>>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Frame) {
        self.frames.lock().push_back(frame);
    }

    pub fn pop(&self) -> Option<Frame> {
        self.frames.lock().pop_front()
    }

    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }
}

/// Flow-control decision for the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    /// Send Pause: the queue is full enough.
    Pause,
    /// Send Play: the queue drained below the resume threshold while the
    /// sender is paused.
    Resume,
}

/// Watermark policy evaluated before every datagram receive.
#[derive(Debug, Clone)]
pub struct FlowPolicy {
    pub capacity: usize,
    pub margin: usize,
    pub prebuffer_threshold: usize,
}

impl Default for FlowPolicy {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            margin: DEFAULT_MARGIN,
            prebuffer_threshold: DEFAULT_PREBUFFER_THRESHOLD,
        }
    }
}

impl FlowPolicy {
    /// Decide whether a flow-control request is due at the given queue
    /// depth.
    ///
    /// `last_request` is the most recently sent control request; it acts as
    /// the "pause outstanding" state, so each watermark crossing produces
    /// exactly one message. During pre-buffering the standard watermarks
    /// are suspended and only the pre-buffer threshold applies.
    pub fn assess(
        &self,
        depth: usize,
        last_request: Option<Method>,
        pre_buffering: bool,
    ) -> Option<FlowAction> {
        if pre_buffering {
            if depth >= self.prebuffer_threshold {
                return Some(FlowAction::Pause);
            }
            return None;
        }

        if depth >= self.capacity && last_request != Some(Method::Pause) {
            Some(FlowAction::Pause)
        } else if depth < self.capacity - self.margin && last_request == Some(Method::Pause) {
            Some(FlowAction::Resume)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FlowPolicy {
        FlowPolicy::default()
    }

    #[test]
    fn queue_is_fifo() {
        let queue = PlaybackQueue::new();
        for index in 1..=3 {
            queue.push(Frame {
                index,
                payload: vec![index as u8],
            });
        }
        assert_eq!(queue.depth(), 3);
        assert_eq!(queue.pop().unwrap().index, 1);
        assert_eq!(queue.pop().unwrap().index, 2);
        assert_eq!(queue.pop().unwrap().index, 3);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn pause_exactly_at_capacity() {
        let p = policy();
        assert_eq!(p.assess(99, Some(Method::Play), false), None);
        assert_eq!(
            p.assess(100, Some(Method::Play), false),
            Some(FlowAction::Pause)
        );
    }

    #[test]
    fn pause_not_repeated_while_outstanding() {
        let p = policy();
        assert_eq!(p.assess(100, Some(Method::Pause), false), None);
        assert_eq!(p.assess(130, Some(Method::Pause), false), None);
    }

    #[test]
    fn resume_exactly_below_low_watermark() {
        let p = policy();
        assert_eq!(p.assess(80, Some(Method::Pause), false), None);
        assert_eq!(
            p.assess(79, Some(Method::Pause), false),
            Some(FlowAction::Resume)
        );
    }

    #[test]
    fn no_resume_without_outstanding_pause() {
        let p = policy();
        assert_eq!(p.assess(79, Some(Method::Play), false), None);
        assert_eq!(p.assess(0, None, false), None);
    }

    #[test]
    fn hysteresis_band_is_silent() {
        let p = policy();
        for depth in 80..100 {
            assert_eq!(p.assess(depth, Some(Method::Play), false), None);
            assert_eq!(p.assess(depth, Some(Method::Pause), false), None);
        }
    }

    #[test]
    fn prebuffer_pauses_at_threshold() {
        let p = policy();
        assert_eq!(p.assess(29, Some(Method::Play), true), None);
        assert_eq!(
            p.assess(30, Some(Method::Play), true),
            Some(FlowAction::Pause)
        );
    }

    #[test]
    fn prebuffer_suspends_standard_watermarks() {
        let p = FlowPolicy {
            capacity: 100,
            margin: 20,
            prebuffer_threshold: 200,
        };
        // Depth past the normal capacity, but pre-buffering owns the decision.
        assert_eq!(p.assess(150, Some(Method::Play), true), None);
    }
}
