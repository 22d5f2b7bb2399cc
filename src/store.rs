//! Sequential length-prefixed frame storage.
//!
//! A frame-store file is the concatenation of records, each a fixed-width
//! decimal length header followed by that many raw payload bytes:
//!
//! ```text
//! <6-digit zero-padded length><payload><6-digit zero-padded length><payload>...
//! ```
//!
//! There is no trailer and no checksum; end-of-file is end-of-stream. A
//! header that does not parse as a decimal integer ends the stream for that
//! read rather than surfacing an error.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StreamError};

/// Width of the decimal length header, in bytes.
pub const LENGTH_HEADER_WIDTH: usize = 6;

/// One media frame: a monotonic index plus its encoded payload.
///
/// Indices start at 1 on the read path, which lets the receive side treat
/// 0 as "nothing accepted yet".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u16,
    pub payload: Vec<u8>,
}

/// Sequential reader over a frame-store file. Server-side only.
#[derive(Debug)]
pub struct FrameStore {
    path: PathBuf,
    file: File,
    next_index: u16,
}

impl FrameStore {
    /// Open an existing frame-store file.
    ///
    /// Fails with [`StreamError::AssetNotFound`] if the file is absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StreamError::AssetNotFound(path.display().to_string()));
        }
        let file = File::open(path)?;
        tracing::debug!(path = %path.display(), "frame store opened");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_index: 1,
        })
    }

    /// Read the next frame, or `None` at end of stream.
    ///
    /// A corrupt length header (non-numeric) is logged and treated as end
    /// of stream for this read; it is not retried.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match read_record(&mut self.file)? {
            Some(payload) => {
                let index = self.next_index;
                self.next_index = self.next_index.wrapping_add(1);
                Ok(Some(Frame { index, payload }))
            }
            None => Ok(None),
        }
    }

    /// Number of frames handed out so far.
    pub fn frames_read(&self) -> u16 {
        self.next_index.wrapping_sub(1)
    }

    /// Count all records in the file.
    ///
    /// Uses a second read handle from offset 0, so the playback cursor is
    /// untouched. Performed once at session setup to report total length.
    pub fn count_frames(&self) -> Result<u64> {
        let mut file = File::open(&self.path)?;
        let mut count = 0u64;
        while read_record(&mut file)?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

/// Read one `<length header><payload>` record; `None` ends the stream.
fn read_record(file: &mut File) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; LENGTH_HEADER_WIDTH];
    let mut filled = 0usize;
    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            if filled > 0 {
                tracing::warn!(bytes = filled, "truncated length header; ending stream");
            }
            return Ok(None);
        }
        filled += n;
    }

    let len = match std::str::from_utf8(&header)
        .ok()
        .and_then(|text| text.trim().parse::<usize>().ok())
    {
        Some(len) => len,
        None => {
            tracing::warn!(
                header = %String::from_utf8_lossy(&header).escape_debug(),
                "corrupt frame record header; ending stream"
            );
            return Ok(None);
        }
    };

    let mut payload = vec![0u8; len];
    match file.read_exact(&mut payload) {
        Ok(()) => Ok(Some(payload)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            tracing::warn!(expected = len, "truncated frame payload; ending stream");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Writer producing the frame-store wire format.
///
/// This is the format the offline transcoder emits; the in-crate writer
/// exists for transcoder implementations and tests.
#[derive(Debug)]
pub struct FrameStoreWriter {
    file: File,
    frames: u64,
}

impl FrameStoreWriter {
    /// Create (or truncate) a frame-store file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            file: File::create(path)?,
            frames: 0,
        })
    }

    /// Append one frame record.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        write!(
            self.file,
            "{:0width$}",
            payload.len(),
            width = LENGTH_HEADER_WIDTH
        )?;
        self.file.write_all(payload)?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(payloads: &[&[u8]]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mjst");
        let mut writer = FrameStoreWriter::create(&path).unwrap();
        for payload in payloads {
            writer.write_frame(payload).unwrap();
        }
        (dir, path)
    }

    #[test]
    fn roundtrip_various_lengths() {
        let big = vec![0xABu8; 3000];
        let payloads: Vec<&[u8]> = vec![b"", b"x", b"hello frame", &big];
        let (_dir, path) = store_with(&payloads);

        let mut store = FrameStore::open(&path).unwrap();
        for (i, expected) in payloads.iter().enumerate() {
            let frame = store.next_frame().unwrap().expect("frame present");
            assert_eq!(frame.index as usize, i + 1);
            assert_eq!(&frame.payload[..], *expected);
        }
        assert!(store.next_frame().unwrap().is_none());
        assert_eq!(store.frames_read(), 4);
    }

    #[test]
    fn open_missing_file_is_asset_not_found() {
        let err = FrameStore::open("/nonexistent/clip.mjst").unwrap_err();
        assert!(matches!(err, StreamError::AssetNotFound(_)));
    }

    #[test]
    fn count_frames_does_not_disturb_cursor() {
        let (_dir, path) = store_with(&[b"one", b"two", b"three"]);
        let mut store = FrameStore::open(&path).unwrap();

        let first = store.next_frame().unwrap().unwrap();
        assert_eq!(first.payload, b"one");

        assert_eq!(store.count_frames().unwrap(), 3);

        let second = store.next_frame().unwrap().unwrap();
        assert_eq!(second.payload, b"two");
    }

    #[test]
    fn corrupt_header_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mjst");
        let mut writer = FrameStoreWriter::create(&path).unwrap();
        writer.write_frame(b"good").unwrap();
        drop(writer);
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not-a-number")
            .unwrap();

        let mut store = FrameStore::open(&path).unwrap();
        assert!(store.next_frame().unwrap().is_some());
        assert!(store.next_frame().unwrap().is_none());
    }

    #[test]
    fn truncated_payload_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.mjst");
        std::fs::write(&path, b"000100only twenty bytes.").unwrap();

        let mut store = FrameStore::open(&path).unwrap();
        assert!(store.next_frame().unwrap().is_none());
    }
}
