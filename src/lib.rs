//! Session-controlled frame streaming over a text control channel and a
//! datagram data channel.
//!
//! The [`server`] exposes frame-store assets; a [`client::Client`] sets up
//! a session, receives fragmented frames on a local datagram port, and
//! reassembles them into a bounded playback queue governed by watermark
//! flow control.

pub mod buffer;
pub mod client;
pub mod error;
pub mod fragment;
pub mod packet;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;
pub mod sync;

pub use buffer::{FlowAction, FlowPolicy, PlaybackQueue};
pub use client::{Client, ClientConfig};
pub use error::{Result, StreamError};
pub use fragment::{MAX_FRAGMENT, Reassembler, fragment_frame};
pub use packet::DataPacket;
pub use server::{Server, ServerConfig};
pub use session::SessionState;
pub use store::{Frame, FrameStore, FrameStoreWriter};
