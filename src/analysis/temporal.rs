use anyhow::Result;
use realfft::RealFftPlanner;

use crate::analysis::buffer::IntensityBuffer;
use crate::analysis::spectrum::{magnitude_spectrum, Band, Domain, SpectralSummary, Spectrum};
use crate::AnalysisError;

/// Band centroids of the intensity window over time, in Hz.
pub struct TemporalSpectrumEstimator {
    bands: Vec<Band>,
    planner: RealFftPlanner<f64>,
}

impl TemporalSpectrumEstimator {
    pub fn new(bands: Vec<Band>) -> Self {
        Self {
            bands,
            planner: RealFftPlanner::new(),
        }
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Estimate over a full buffer. A partially filled buffer is rejected
    /// with `AnalysisError::InsufficientData`.
    pub fn estimate(&mut self, buffer: &IntensityBuffer, fps: f64) -> Result<SpectralSummary> {
        if !buffer.is_full() {
            return Err(AnalysisError::InsufficientData {
                have: buffer.len(),
                need: buffer.capacity(),
            }
            .into());
        }
        self.estimate_window(&buffer.snapshot(), fps)
    }

    /// Estimate over an arbitrary window sampled at `fps`.
    ///
    /// Bin `k` sits at `k * fps / N`.
    pub fn estimate_window(&mut self, window: &[f64], fps: f64) -> Result<SpectralSummary> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(AnalysisError::InvalidSampleRate(fps).into());
        }
        if window.is_empty() {
            return Err(AnalysisError::InsufficientData { have: 0, need: 1 }.into());
        }
        let magnitudes = magnitude_spectrum(&mut self.planner, window)?;
        let n = window.len() as f64;
        let frequencies = (0..magnitudes.len())
            .map(|k| k as f64 * fps / n)
            .collect();
        let spectrum = Spectrum {
            domain: Domain::Temporal,
            frequencies,
            magnitudes,
        };
        Ok(SpectralSummary::from_spectrum(spectrum, &self.bands))
    }
}

impl Default for TemporalSpectrumEstimator {
    fn default() -> Self {
        Self::new(Band::default_temporal())
    }
}
