//! Asset resolution with quality variants and transcoder fallback.
//!
//! A setup request names an asset (`movie.Mjpeg`) and optionally a quality.
//! The HD variant of `movie.Mjpeg` lives at `movie_hd.Mjpeg`. Resolution:
//!
//! 1. If the variant file exists and already carries frame-store length
//!    headers, serve it as-is.
//! 2. If the variant file exists but is raw media (no length headers),
//!    transcode it in place.
//! 3. If the variant is missing but the source asset exists, regenerate
//!    the variant from the source via the transcoder.
//! 4. Otherwise the asset does not resolve.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Result, StreamError};
use crate::protocol::Quality;
use crate::store::LENGTH_HEADER_WIDTH;

/// Offline converter from a source media file to the frame-store format.
///
/// Treated as a black box: the crate never transcodes media itself and
/// invokes an implementation only when a requested asset variant is
/// missing or not yet in frame-store form.
pub trait Transcoder: Send + Sync {
    fn transcode(&self, source: &Path, target: &Path) -> Result<()>;
}

/// Transcoder that refuses every conversion.
///
/// The default for servers without an embedder-supplied converter: a
/// missing variant then resolves to asset-not-found (a 404 reply) instead
/// of being regenerated.
#[derive(Debug, Default)]
pub struct NullTranscoder;

impl Transcoder for NullTranscoder {
    fn transcode(&self, source: &Path, _target: &Path) -> Result<()> {
        Err(StreamError::AssetNotFound(source.display().to_string()))
    }
}

/// Map an asset name and quality to the concrete variant filename.
///
/// `movie.Mjpeg` + HD → `movie_hd.Mjpeg`; extensionless names get a plain
/// `_hd` suffix. Normal quality is the name unchanged.
pub fn variant_name(name: &str, quality: Quality) -> String {
    match quality {
        Quality::Normal => name.to_string(),
        Quality::Hd => match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}_hd.{ext}"),
            None => format!("{name}_hd"),
        },
    }
}

/// Resolve an asset to a ready-to-serve frame-store file.
pub fn prepare_asset(
    root: &Path,
    name: &str,
    quality: Quality,
    transcoder: &dyn Transcoder,
) -> Result<PathBuf> {
    let target = root.join(variant_name(name, quality));
    let source = root.join(name);

    if target.exists() {
        if has_frame_header(&target)? {
            return Ok(target);
        }
        tracing::info!(
            target = %target.display(),
            "asset lacks frame headers; transcoding in place"
        );
        transcoder.transcode(&target, &target)?;
        return Ok(target);
    }

    if source.exists() {
        tracing::info!(
            source = %source.display(),
            target = %target.display(),
            "variant missing; regenerating from source"
        );
        transcoder.transcode(&source, &target)?;
        return Ok(target);
    }

    Err(StreamError::AssetNotFound(name.to_string()))
}

/// Whether the file starts with a decimal length header.
fn has_frame_header(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut header = [0u8; LENGTH_HEADER_WIDTH];
    match file.read_exact(&mut header) {
        Ok(()) => Ok(header.iter().all(|b| b.is_ascii_digit())),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
