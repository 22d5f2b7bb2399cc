//! Error types for the streaming library.

use std::fmt;

/// Errors that can occur across the streaming stack.
///
/// Variants map to specific failure modes:
///
/// - **Transport**: [`Io`](Self::Io) — control-connection or datagram
///   socket failures, including a failed initial connect.
/// - **Control plane**: [`Parse`](Self::Parse) — malformed control
///   requests or replies.
/// - **Data plane**: [`MalformedPacket`](Self::MalformedPacket) — a
///   datagram too short to carry the fixed packet header.
/// - **Assets**: [`AssetNotFound`](Self::AssetNotFound) — the requested
///   media asset (or its quality variant) is absent even after fallback
///   regeneration.
/// - **Client**: [`PortBind`](Self::PortBind) — the fixed local datagram
///   port is unavailable; the session cannot proceed.
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No usable frame-store file for the requested asset name.
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    /// Datagram shorter than the 12-byte fixed packet header.
    #[error("malformed data packet: {len} bytes (need at least 12)")]
    MalformedPacket { len: usize },

    /// Failed to parse a control-plane request or reply.
    #[error("control message parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The requested local datagram port could not be bound.
    #[error("unable to bind local data port {port}")]
    PortBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Specific kind of control-message parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request or status line).
    EmptyMessage,
    /// Request line did not have the expected `Method resource Version` format.
    InvalidRequestLine,
    /// Reply status line did not have the expected `Version code reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// Unknown control method.
    InvalidMethod,
    /// A required header was absent.
    MissingHeader(&'static str),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidMethod => write!(f, "invalid method"),
            Self::MissingHeader(name) => write!(f, "missing header: {name}"),
        }
    }
}

/// Convenience alias for `Result<T, StreamError>`.
pub type Result<T> = std::result::Result<T, StreamError>;
