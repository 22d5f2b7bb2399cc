use crate::error::{ParseErrorKind, Result, StreamError};

use super::PROTOCOL_VERSION;

/// A control reply.
///
/// ```text
/// RTSP/1.0 <code> <reason>
/// CSeq: <int>
/// Session: <int>
/// [Total-Frames: <int>]
/// ```
///
/// `Total-Frames` appears only on a successful setup reply when the server
/// knows the asset length. The echoed `CSeq` is what the client correlates
/// on; a reply whose sequence number does not match the last sent request
/// is dropped.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    pub status_code: u16,
    pub reason: String,
    /// Echo of the request's sequence number.
    pub cseq: u32,
    /// Session id (0 before assignment, e.g. on a 404 or an Init teardown).
    pub session: u32,
    pub total_frames: Option<u64>,
}

impl ControlResponse {
    pub fn new(status_code: u16, reason: &str, cseq: u32, session: u32) -> Self {
        Self {
            status_code,
            reason: reason.to_string(),
            cseq,
            session,
            total_frames: None,
        }
    }

    /// 200 OK.
    pub fn ok(cseq: u32, session: u32) -> Self {
        Self::new(200, "OK", cseq, session)
    }

    /// 404 Not Found — the requested asset does not resolve.
    pub fn not_found(cseq: u32) -> Self {
        Self::new(404, "Not Found", cseq, 0)
    }

    /// 500 Internal Server Error.
    pub fn server_error(cseq: u32) -> Self {
        Self::new(500, "Internal Server Error", cseq, 0)
    }

    pub fn with_total_frames(mut self, total: u64) -> Self {
        self.total_frames = Some(total);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }

    /// Serialize to the newline-separated wire format.
    pub fn serialize(&self) -> String {
        let mut out = format!(
            "{} {} {}\nCSeq: {}\nSession: {}",
            PROTOCOL_VERSION, self.status_code, self.reason, self.cseq, self.session
        );
        if let Some(total) = self.total_frames {
            out.push_str(&format!("\nTotal-Frames: {total}"));
        }
        out
    }

    /// Parse a reply from its text representation.
    ///
    /// `CSeq` and `Session` are required; `Total-Frames` is optional.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();

        let status_line = lines.next().ok_or(StreamError::Parse {
            kind: ParseErrorKind::EmptyMessage,
        })?;
        let mut parts = status_line.split_whitespace();
        let version = parts.next().unwrap_or("");
        let code = parts.next().and_then(|c| c.parse::<u16>().ok());
        let (Some(status_code), true) = (code, version.starts_with("RTSP/")) else {
            return Err(StreamError::Parse {
                kind: ParseErrorKind::InvalidStatusLine,
            });
        };
        let reason = parts.collect::<Vec<_>>().join(" ");

        let mut cseq = None;
        let mut session = None;
        let mut total_frames = None;
        for line in lines {
            if line.trim().is_empty() {
                break;
            }
            let Some(colon) = line.find(':') else {
                return Err(StreamError::Parse {
                    kind: ParseErrorKind::InvalidHeader,
                });
            };
            let name = line[..colon].trim();
            let value = line[colon + 1..].trim();
            if name.eq_ignore_ascii_case("CSeq") {
                cseq = value.parse().ok();
            } else if name.eq_ignore_ascii_case("Session") {
                session = value.parse().ok();
            } else if name.eq_ignore_ascii_case("Total-Frames") {
                total_frames = value.parse().ok();
            }
        }

        let cseq = cseq.ok_or(StreamError::Parse {
            kind: ParseErrorKind::MissingHeader("CSeq"),
        })?;
        let session = session.ok_or(StreamError::Parse {
            kind: ParseErrorKind::MissingHeader("Session"),
        })?;

        Ok(Self {
            status_code,
            reason,
            cseq,
            session,
            total_frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_ok_with_total_frames() {
        let resp = ControlResponse::ok(1, 481516).with_total_frames(240);
        assert_eq!(
            resp.serialize(),
            "RTSP/1.0 200 OK\nCSeq: 1\nSession: 481516\nTotal-Frames: 240"
        );
    }

    #[test]
    fn parse_setup_reply() {
        let resp =
            ControlResponse::parse("RTSP/1.0 200 OK\nCSeq: 1\nSession: 481516\nTotal-Frames: 240")
                .unwrap();
        assert!(resp.is_ok());
        assert_eq!(resp.cseq, 1);
        assert_eq!(resp.session, 481516);
        assert_eq!(resp.total_frames, Some(240));
    }

    #[test]
    fn parse_reply_without_total_frames() {
        let resp = ControlResponse::parse("RTSP/1.0 200 OK\nCSeq: 3\nSession: 123456").unwrap();
        assert_eq!(resp.total_frames, None);
    }

    #[test]
    fn parse_not_found() {
        let resp = ControlResponse::parse("RTSP/1.0 404 Not Found\nCSeq: 1\nSession: 0").unwrap();
        assert!(!resp.is_ok());
        assert_eq!(resp.status_code, 404);
        assert_eq!(resp.reason, "Not Found");
    }

    #[test]
    fn parse_missing_session_is_error() {
        let err = ControlResponse::parse("RTSP/1.0 200 OK\nCSeq: 1").unwrap_err();
        assert!(matches!(
            err,
            StreamError::Parse {
                kind: ParseErrorKind::MissingHeader("Session")
            }
        ));
    }

    #[test]
    fn parse_garbage_status_line() {
        assert!(ControlResponse::parse("garbage here\nCSeq: 1\nSession: 0").is_err());
        assert!(ControlResponse::parse("").is_err());
    }

    #[test]
    fn roundtrip() {
        let resp = ControlResponse::server_error(7);
        let parsed = ControlResponse::parse(&resp.serialize()).unwrap();
        assert_eq!(parsed, resp);
    }
}
