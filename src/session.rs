//! Session lifecycle shared by both endpoints.
//!
//! Server and client each hold their own mirror of the same state machine:
//!
//! ```text
//! Init  --Setup ok-->  Ready  --Play-->  Playing
//!                      Ready  <--Pause--  Playing
//! Teardown (any state) --> Init
//! ```
//!
//! Requests arriving outside their legal source state are not applied.

/// Playback state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session established yet.
    Init,
    /// Session set up; frames may accumulate but playback is not running.
    Ready,
    /// Media is being delivered.
    Playing,
}
