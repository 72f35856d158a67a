//! Per-pipeline analysis context.
//!
//! `AnalysisSession` owns every piece of cross-frame state the pipeline
//! needs: the intensity window, the previous downsampled frame and the
//! estimators. The driver creates one per stream and feeds it frames in
//! acquisition order; each call to `process` is one analysis cycle.

use anyhow::Result;
use serde::Serialize;

use crate::analysis::{
    IntensityBuffer, SpatialSpectrumEstimator, SpectralSummary, TemporalSpectrumEstimator,
};
use crate::config::AnalyzerConfig;
use crate::dispatch::WaveMetrics;
use crate::frame::{FramePair, GrayFrame};
use crate::motion::{DirectionEstimate, DirectionEstimator};

/// Everything one cycle produced.
#[derive(Clone, Debug, Serialize)]
pub struct CycleReport {
    /// Zero-based index of the frame in acquisition order.
    pub frame_index: u64,
    /// Fill ratio of the intensity window while it is still warming up.
    pub warmup: Option<f64>,
    pub temporal: Option<SpectralSummary>,
    pub spatial: Option<SpectralSummary>,
    pub direction: Option<DirectionEstimate>,
}

impl CycleReport {
    /// Scalar outputs for dispatch; only available once temporal analysis ran.
    pub fn metrics(&self) -> Option<WaveMetrics> {
        self.temporal
            .as_ref()
            .map(|temporal| WaveMetrics::new(temporal, self.direction.as_ref()))
    }
}

pub struct AnalysisSession {
    buffer: IntensityBuffer,
    temporal: TemporalSpectrumEstimator,
    spatial: SpatialSpectrumEstimator,
    direction: DirectionEstimator,
    fps: f64,
    row_start: u32,
    row_end: u32,
    flow_size: (u32, u32),
    smoothing: u32,
    previous: Option<GrayFrame>,
    frames: u64,
}

impl AnalysisSession {
    /// Build a session sampling at `fps`. The configuration is validated first.
    pub fn new(config: &AnalyzerConfig, fps: f64) -> Result<Self> {
        config.validate()?;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(crate::AnalysisError::InvalidSampleRate(fps).into());
        }
        let direction = DirectionEstimator::with_kind(
            config.direction.backend,
            config.direction.flow.clone(),
            config.direction.threshold,
            config.direction.averaging,
        )?;
        log::info!(
            "analysis session: {} samples @ {:.2} fps, strip rows {}..{}, flow {}x{} ({})",
            config.buffer.capacity,
            fps,
            config.buffer.row_start,
            config.buffer.row_end,
            config.direction.width,
            config.direction.height,
            direction.backend_name()
        );
        Ok(Self {
            buffer: IntensityBuffer::new(config.buffer.capacity),
            temporal: TemporalSpectrumEstimator::new(config.temporal_bands.clone()),
            spatial: SpatialSpectrumEstimator::new(
                config.spatial.bands.clone(),
                config.spatial.strip_rows,
            ),
            direction,
            fps,
            row_start: config.buffer.row_start,
            row_end: config.buffer.row_end,
            flow_size: (config.direction.width, config.direction.height),
            smoothing: config.direction.smoothing,
            previous: None,
            frames: 0,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn buffer(&self) -> &IntensityBuffer {
        &self.buffer
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Run one analysis cycle on the next frame of the stream.
    pub fn process(&mut self, pair: &FramePair) -> Result<CycleReport> {
        let gray = &pair.gray;
        let mut reduced = gray.resize(self.flow_size.0, self.flow_size.1)?;
        if self.smoothing > 0 {
            reduced = reduced.blur(self.smoothing, 0.0)?;
        }
        self.buffer.push(gray.strip_mean(self.row_start, self.row_end));

        let mut report = CycleReport {
            frame_index: self.frames,
            warmup: None,
            temporal: None,
            spatial: None,
            direction: None,
        };
        self.frames += 1;

        if let Some(previous) = self.previous.replace(reduced) {
            if let Some(current) = &self.previous {
                report.direction = Some(self.direction.estimate(&previous, current)?);
            }
            report.spatial = Some(self.spatial.estimate(gray)?);
        }

        if self.buffer.is_full() {
            report.temporal = Some(self.temporal.estimate(&self.buffer, self.fps)?);
        } else {
            report.warmup = Some(self.buffer.fill_ratio());
        }

        log::debug!(
            "cycle {}: fill {:.2} direction {:?}",
            report.frame_index,
            self.buffer.fill_ratio(),
            report.direction.and_then(|d| d.degrees())
        );
        Ok(report)
    }

    /// Drop all history; the next frame starts a fresh warm-up.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.previous = None;
    }
}
