//! Control-plane text protocol.
//!
//! Session setup and playback control travel over a reliable connection as
//! line-oriented text, one message per socket write:
//!
//! ```text
//! C: SETUP movie.Mjpeg RTSP/1.0
//! C: CSeq: 1
//! C: Transport: RTP/UDP; client_port=25000
//!
//! S: RTSP/1.0 200 OK
//! S: CSeq: 1
//! S: Session: 481516
//! S: Total-Frames: 240
//! ```
//!
//! Requests and replies share the newline-separated header format; replies
//! echo the request's sequence number, which the client uses to correlate
//! them. Neither side ever retransmits a control message.

mod request;
mod response;

use std::fmt;
use std::str::FromStr;

use crate::error::{ParseErrorKind, StreamError};

pub use request::ControlRequest;
pub use response::ControlResponse;

/// Protocol version token on every request and status line.
pub const PROTOCOL_VERSION: &str = "RTSP/1.0";

/// Control method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Setup,
    Play,
    Pause,
    Teardown,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Teardown => "TEARDOWN",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SETUP" => Ok(Self::Setup),
            "PLAY" => Ok(Self::Play),
            "PAUSE" => Ok(Self::Pause),
            "TEARDOWN" => Ok(Self::Teardown),
            _ => Err(StreamError::Parse {
                kind: ParseErrorKind::InvalidMethod,
            }),
        }
    }
}

/// Requested asset quality, carried in the `X-Quality` setup header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    Normal,
    Hd,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Hd => "HD",
        }
    }

    /// Parse a header value; anything other than `HD` is `Normal`.
    pub fn from_header(value: &str) -> Self {
        if value.trim() == "HD" {
            Self::Hd
        } else {
            Self::Normal
        }
    }
}
