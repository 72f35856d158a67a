//! Local file frame source.
//!
//! This module provides `FileSource` for ingesting frames from local video files.
//! The file source is responsible for:
//! - Reading frames from a local video file (no network access)
//! - Decoding video frames in-memory
//! - Producing `FramePair` instances in decode order
//!
//! `stub://` paths select a deterministic synthetic traveling wave instead of
//! a decoder, which is what tests and the demo binary run against.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{FrameSource, SourceStats};
use crate::frame::{FramePair, GrayFrame};

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "/data/waves.mp4") or `stub://name`.
    pub path: String,
    /// Frame rate reported by the synthetic source; decoders report their own.
    pub target_fps: f64,
    /// Synthetic frame size.
    pub width: u32,
    pub height: u32,
    pub synthetic: SyntheticWave,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: "stub://waves".to_string(),
            target_fps: crate::DEFAULT_FPS,
            width: 320,
            height: 240,
            synthetic: SyntheticWave::default(),
        }
    }
}

/// Parameters of the synthetic wave field.
///
/// Brightness at `(x, y)` and time `t` is
/// `128 + A·e(x)·sin(2π(c·x/W − f·t)) + B·sin(2π·y/L) + noise`, a wave
/// travelling towards +x over a static horizontal texture. The envelope
/// `e(x) = 0.3 + 0.7·x/W` keeps the strip mean oscillating at `f`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticWave {
    /// Temporal frequency `f` in Hz.
    pub temporal_hz: f64,
    /// Spatial frequency `c` in cycles per frame width.
    pub cycles_per_width: f64,
    /// Wave amplitude `A`.
    pub amplitude: f64,
    /// Amplitude `B` of the static texture.
    pub texture_amplitude: f64,
    /// Texture period `L` in rows.
    pub texture_period: f64,
    /// Uniform noise half-range, in gray levels.
    pub noise: f64,
    pub seed: u64,
    /// Stop after this many frames; unbounded when absent.
    pub frame_limit: Option<u64>,
}

impl Default for SyntheticWave {
    fn default() -> Self {
        Self {
            temporal_hz: 1.5,
            cycles_per_width: 2.0,
            amplitude: 60.0,
            texture_amplitude: 25.0,
            texture_period: 24.0,
            noise: 2.0,
            seed: 7,
            frame_limit: None,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config)?),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "file ingestion requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_pair(&mut self) -> Result<Option<FramePair>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_pair(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_pair(),
        }
    }

    fn nominal_fps(&self) -> Option<f64> {
        match &self.backend {
            FileBackend::Synthetic(source) => Some(source.config.target_fps),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.nominal_fps(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    config: FileConfig,
    frame_count: u64,
    rng: StdRng,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic source needs a non-empty frame size"));
        }
        if !(config.target_fps.is_finite() && config.target_fps > 0.0) {
            return Err(anyhow!("synthetic source needs a positive frame rate"));
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(config.synthetic.seed),
            config,
            frame_count: 0,
        })
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "FileSource: connected to {} (synthetic {}x{} @ {:.1} fps)",
            self.config.path,
            self.config.width,
            self.config.height,
            self.config.target_fps
        );
        Ok(())
    }

    fn next_pair(&mut self) -> Result<Option<FramePair>> {
        if let Some(limit) = self.config.synthetic.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        let t = self.frame_count as f64 / self.config.target_fps;
        self.frame_count += 1;

        let wave = &self.config.synthetic;
        let w = self.config.width as f64;
        let noise = wave.noise.max(0.0);
        let rng = &mut self.rng;
        let gray = GrayFrame::from_fn(self.config.width, self.config.height, |x, y| {
            let u = x as f64 / w;
            let envelope = 0.3 + 0.7 * u;
            let phase = TAU * (wave.cycles_per_width * u - wave.temporal_hz * t);
            let texture = if wave.texture_period > 0.0 {
                wave.texture_amplitude * (TAU * y as f64 / wave.texture_period).sin()
            } else {
                0.0
            };
            let jitter = if noise > 0.0 {
                rng.gen_range(-noise..=noise)
            } else {
                0.0
            };
            let v = 128.0 + wave.amplitude * envelope * phase.sin() + texture + jitter;
            v.round().clamp(0.0, 255.0) as u8
        });
        Ok(Some(FramePair::from_gray(gray)))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(limit: u64) -> FileConfig {
        FileConfig {
            width: 64,
            height: 32,
            synthetic: SyntheticWave {
                frame_limit: Some(limit),
                ..SyntheticWave::default()
            },
            ..FileConfig::default()
        }
    }

    #[test]
    fn synthetic_source_produces_pairs_until_limit() -> Result<()> {
        let mut source = FileSource::new(stub_config(3))?;
        source.connect()?;
        let mut count = 0;
        while let Some(pair) = source.next_pair()? {
            assert_eq!(pair.gray.dimensions(), (64, 32));
            assert_eq!(pair.color.pixels().len(), 64 * 32 * 3);
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(source.stats().frames_captured, 3);
        Ok(())
    }

    #[test]
    fn synthetic_source_is_deterministic() -> Result<()> {
        let mut a = FileSource::new(stub_config(2))?;
        let mut b = FileSource::new(stub_config(2))?;
        for _ in 0..2 {
            let fa = a.next_pair()?.map(|p| p.gray);
            let fb = b.next_pair()?.map(|p| p.gray);
            assert_eq!(fa, fb);
        }
        Ok(())
    }

    #[test]
    fn synthetic_frames_change_over_time() -> Result<()> {
        let mut source = FileSource::new(stub_config(2))?;
        let first = source.next_pair()?.map(|p| p.gray);
        let second = source.next_pair()?.map(|p| p.gray);
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn file_source_rejects_urls() {
        let config = FileConfig {
            path: "http://example.com/video.mp4".to_string(),
            ..FileConfig::default()
        };
        assert!(FileSource::new(config).is_err());
    }

    #[test]
    fn synthetic_source_reports_fps() -> Result<()> {
        let source = FileSource::new(FileConfig::default())?;
        assert_eq!(source.nominal_fps(), Some(crate::DEFAULT_FPS));
        Ok(())
    }
}
