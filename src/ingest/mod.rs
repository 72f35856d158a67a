//! Frame ingestion sources.
//!
//! This module provides different sources for frame pairs:
//! - Synthetic traveling-wave generator (`stub://` paths)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Only local ingestion is supported. Paths carrying a URL scheme other than
//! `stub://` are rejected.
//!
//! All sources produce `FramePair` instances (color plus grayscale) in
//! acquisition order and signal end-of-stream with `Ok(None)`.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::config::SourceSettings;
use crate::frame::FramePair;

pub use file::{FileConfig, FileSource, SyntheticWave};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Pull-based frame source.
pub trait FrameSource {
    /// Open the underlying device or file.
    fn connect(&mut self) -> Result<()>;

    /// Next frame pair, or `None` once the stream is exhausted.
    fn next_pair(&mut self) -> Result<Option<FramePair>>;

    /// Frame rate reported by the source, if it knows one.
    fn nominal_fps(&self) -> Option<f64>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Statistics common to every source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub path: String,
}

/// Open the source named by `settings.path`.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    #[cfg(feature = "ingest-v4l2")]
    if settings.path.starts_with("/dev/video") {
        let config = v4l2::V4l2Config {
            device: settings.path.clone(),
            target_fps: settings.fps.unwrap_or(settings.fallback_fps).round() as u32,
            width: settings.width,
            height: settings.height,
        };
        return Ok(Box::new(V4l2Source::new(config)?));
    }

    let config = FileConfig {
        path: settings.path.clone(),
        target_fps: settings.fps.unwrap_or(settings.fallback_fps),
        width: settings.width,
        height: settings.height,
        synthetic: settings.synthetic.clone(),
    };
    Ok(Box::new(FileSource::new(config)?))
}

/// Sampling rate for analysis: the forced rate if configured, else the
/// source's nominal rate when it is usable, else `fallback`.
pub fn effective_fps(forced: Option<f64>, nominal: Option<f64>, fallback: f64) -> f64 {
    forced
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .or_else(|| nominal.filter(|fps| fps.is_finite() && *fps > 0.0))
        .unwrap_or(fallback)
}
