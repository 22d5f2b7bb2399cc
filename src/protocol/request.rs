use std::str::FromStr;

use crate::error::{ParseErrorKind, Result, StreamError};

use super::{Method, PROTOCOL_VERSION, Quality};

/// A control request.
///
/// ```text
/// <METHOD> <resource-name> RTSP/1.0
/// CSeq: <int>
/// *(Header: Value)
/// ```
///
/// Setup carries `Transport: RTP/UDP; client_port=<port>` plus the optional
/// `Frame-Rate` and `X-Quality` headers; Play/Pause/Teardown carry
/// `Session: <id>`. Header lookup is case-insensitive.
#[derive(Debug)]
pub struct ControlRequest {
    pub method: Method,
    /// Requested asset name (e.g. `movie.Mjpeg`).
    pub resource: String,
    /// Headers as ordered (name, value) pairs, serialized in insertion order.
    pub headers: Vec<(String, String)>,
}

impl ControlRequest {
    pub fn new(method: Method, resource: &str) -> Self {
        Self {
            method,
            resource: resource.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Parse a request from its text representation.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();

        let request_line = lines.next().ok_or(StreamError::Parse {
            kind: ParseErrorKind::EmptyMessage,
        })?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(StreamError::Parse {
                kind: ParseErrorKind::InvalidRequestLine,
            });
        }

        let method = Method::from_str(parts[0])?;
        let resource = parts[1].to_string();
        if parts[2] != PROTOCOL_VERSION {
            tracing::warn!(version = parts[2], "unexpected protocol version");
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                break;
            }
            let colon = line.find(':').ok_or(StreamError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;
            headers.push((
                line[..colon].trim().to_string(),
                line[colon + 1..].trim().to_string(),
            ));
        }

        Ok(Self {
            method,
            resource,
            headers,
        })
    }

    /// Serialize to the newline-separated wire format.
    pub fn serialize(&self) -> String {
        let mut out = format!("{} {} {}", self.method, self.resource, PROTOCOL_VERSION);
        for (name, value) in &self.headers {
            out.push('\n');
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
        }
        out
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Request sequence number. Every request carries one; the reply must
    /// echo it.
    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq").and_then(|v| v.trim().parse().ok())
    }

    /// Session id from the `Session` header (Play/Pause/Teardown).
    pub fn session_id(&self) -> Option<u32> {
        self.get_header("Session")
            .and_then(|v| v.trim().parse().ok())
    }

    /// Client-side datagram port from the setup `Transport` header.
    pub fn client_port(&self) -> Option<u16> {
        self.get_header("Transport").and_then(|transport| {
            transport
                .split(';')
                .find_map(|part| part.trim().strip_prefix("client_port="))
                .and_then(|v| v.trim().parse().ok())
        })
    }

    /// Requested playback frame rate, when present and positive.
    pub fn frame_rate(&self) -> Option<u32> {
        self.get_header("Frame-Rate")
            .and_then(|v| v.trim().parse().ok())
            .filter(|fps| *fps > 0)
    }

    /// Requested asset quality; defaults to normal.
    pub fn quality(&self) -> Quality {
        self.get_header("X-Quality")
            .map(Quality::from_header)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_setup_request() {
        let raw = "SETUP movie.Mjpeg RTSP/1.0\n\
                   CSeq: 1\n\
                   Transport: RTP/UDP; client_port=25000";
        let req = ControlRequest::parse(raw).unwrap();
        assert_eq!(req.method, Method::Setup);
        assert_eq!(req.resource, "movie.Mjpeg");
        assert_eq!(req.cseq(), Some(1));
        assert_eq!(req.client_port(), Some(25000));
        assert_eq!(req.quality(), Quality::Normal);
        assert_eq!(req.frame_rate(), None);
    }

    #[test]
    fn parse_setup_with_rate_and_quality() {
        let raw = "SETUP movie.Mjpeg RTSP/1.0\n\
                   CSeq: 1\n\
                   Transport: RTP/UDP; client_port=25000\n\
                   Frame-Rate: 30\n\
                   X-Quality: HD";
        let req = ControlRequest::parse(raw).unwrap();
        assert_eq!(req.frame_rate(), Some(30));
        assert_eq!(req.quality(), Quality::Hd);
    }

    #[test]
    fn parse_play_with_session() {
        let raw = "PLAY movie.Mjpeg RTSP/1.0\nCSeq: 2\nSession: 481516";
        let req = ControlRequest::parse(raw).unwrap();
        assert_eq!(req.method, Method::Play);
        assert_eq!(req.session_id(), Some(481516));
    }

    #[test]
    fn serialize_matches_wire_format() {
        let req = ControlRequest::new(Method::Setup, "movie.Mjpeg")
            .add_header("CSeq", "1")
            .add_header("Transport", "RTP/UDP; client_port=25000");
        assert_eq!(
            req.serialize(),
            "SETUP movie.Mjpeg RTSP/1.0\nCSeq: 1\nTransport: RTP/UDP; client_port=25000"
        );
    }

    #[test]
    fn serialize_parse_roundtrip() {
        let req = ControlRequest::new(Method::Teardown, "movie.Mjpeg")
            .add_header("CSeq", "9")
            .add_header("Session", "123456");
        let parsed = ControlRequest::parse(&req.serialize()).unwrap();
        assert_eq!(parsed.method, Method::Teardown);
        assert_eq!(parsed.cseq(), Some(9));
        assert_eq!(parsed.session_id(), Some(123456));
    }

    #[test]
    fn parse_empty_message() {
        assert!(ControlRequest::parse("").is_err());
    }

    #[test]
    fn parse_unknown_method() {
        assert!(ControlRequest::parse("DESCRIBE movie.Mjpeg RTSP/1.0\nCSeq: 1").is_err());
    }

    #[test]
    fn header_lookup_case_insensitive() {
        let req = ControlRequest::parse("PLAY movie.Mjpeg RTSP/1.0\ncseq: 42").unwrap();
        assert_eq!(req.cseq(), Some(42));
    }

    #[test]
    fn zero_frame_rate_ignored() {
        let raw = "SETUP movie.Mjpeg RTSP/1.0\nCSeq: 1\nFrame-Rate: 0";
        assert_eq!(ControlRequest::parse(raw).unwrap().frame_rate(), None);
    }
}
