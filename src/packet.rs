//! Binary data-packet codec for the datagram channel.

use crate::error::{Result, StreamError};

/// Fixed header length in bytes.
pub const HEADER_LEN: usize = 12;

/// Protocol version carried in the two high bits of the first byte.
pub const VERSION: u8 = 2;

/// Payload type for JPEG-encoded frames.
pub const PAYLOAD_TYPE_MJPEG: u8 = 26;

/// One data-plane packet: fixed 12-byte header plus payload.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The sequence number identifies the *frame*: every fragment of one frame
/// carries the same value, and the marker bit flags the final fragment.
/// [`encode`](Self::encode) and [`decode`](Self::decode) are exact inverses;
/// both are pure and stateless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    /// Contributing-source count (4-bit). Always 0 on the send path.
    pub csrc_count: u8,
    /// Set on the final fragment of a frame.
    pub marker: bool,
    /// 7-bit payload type.
    pub payload_type: u8,
    /// Frame index shared by all fragments of one frame.
    pub sequence: u16,
    pub timestamp: u32,
    /// Source identifier. Always 0 on the send path.
    pub ssrc: u32,
    pub payload: Vec<u8>,
}

impl DataPacket {
    /// Build a packet with this stack's fixed fields (version 2, MJPEG
    /// payload type, zero SSRC, no padding/extension/CSRCs).
    pub fn new(sequence: u16, marker: bool, timestamp: u32, payload: Vec<u8>) -> Self {
        Self {
            version: VERSION,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker,
            payload_type: PAYLOAD_TYPE_MJPEG,
            sequence,
            timestamp,
            ssrc: 0,
            payload,
        }
    }

    /// Serialize header and payload into one datagram-ready buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(
            (self.version << 6)
                | ((self.padding as u8) << 5)
                | ((self.extension as u8) << 4)
                | (self.csrc_count & 0x0f),
        );
        buf.push(((self.marker as u8) << 7) | (self.payload_type & 0x7f));
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.ssrc.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a received datagram.
    ///
    /// Fails with [`StreamError::MalformedPacket`] when fewer than
    /// [`HEADER_LEN`] bytes are present. Everything after the header is
    /// the payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(StreamError::MalformedPacket { len: bytes.len() });
        }

        Ok(Self {
            version: bytes[0] >> 6,
            padding: bytes[0] & 0x20 != 0,
            extension: bytes[0] & 0x10 != 0,
            csrc_count: bytes[0] & 0x0f,
            marker: bytes[1] & 0x80 != 0,
            payload_type: bytes[1] & 0x7f,
            sequence: u16::from_be_bytes([bytes[2], bytes[3]]),
            timestamp: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            ssrc: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }
}
