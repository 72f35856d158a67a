//! Wave field analyzer
//!
//! This crate extracts two physical descriptors of a visible wave field from a
//! video stream:
//!
//! 1. **Direction**: the dominant propagation direction, estimated from dense
//!    optical flow between consecutive downsampled frames.
//! 2. **Band frequencies**: magnitude-weighted centroid frequencies in the
//!    low/mid/high bands, both temporally (mean intensity of a fixed strip over
//!    time) and spatially (brightness variation along one row of a frame).
//!
//! # Module Structure
//!
//! - `frame`: Frame containers (ColorFrame, GrayFrame, FramePair) and sampling
//! - `analysis`: IntensityBuffer and the temporal/spatial spectrum estimators
//! - `motion`: Dense optical flow backends and the DirectionEstimator
//! - `ingest`: Frame sources (synthetic, local files, V4L2 cameras)
//! - `dispatch`: Outbound metric dispatchers (OSC, MQTT, log)
//! - `present`: Presenter interface for overlays and summaries
//! - `session`: AnalysisSession, the per-pipeline context driven once per frame
//! - `config`: AnalyzerConfig loading and validation

pub mod analysis;
pub mod config;
pub mod dispatch;
pub mod frame;
pub mod ingest;
pub mod motion;
pub mod present;
pub mod session;

pub use analysis::{
    Band, BandCentroid, Domain, IntensityBuffer, SpatialSpectrumEstimator, SpectralSummary,
    Spectrum, TemporalSpectrumEstimator,
};
pub use config::AnalyzerConfig;
pub use dispatch::{Dispatcher, WaveMetrics};
pub use frame::{ColorFrame, FramePair, GrayFrame};
pub use ingest::{open_source, FileConfig, FileSource, FrameSource};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{v4l2::V4l2Config, V4l2Source};
pub use motion::{
    AngleAveraging, DirectionEstimate, DirectionEstimator, FarnebackBackend, FarnebackParams,
    FlowBackend, FlowBackendKind, FlowField,
};
pub use present::{LogPresenter, Presenter, PresenterOptions};
pub use session::{AnalysisSession, CycleReport};

/// Sampling rate assumed when a source cannot report one.
pub const DEFAULT_FPS: f64 = 30.0;

// -------------------- Errors --------------------

/// Contract violations raised by the analysis core.
///
/// Degenerate inputs (static scenes, constant rows, no motion) are NOT errors;
/// they produce zero centroids or `DirectionEstimate::NoMotion`. Only callers
/// breaking the input contract see one of these, wrapped in `anyhow::Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Temporal estimation requested before the intensity window is full.
    InsufficientData { have: usize, need: usize },
    /// Sampling rate was zero, negative or not finite.
    InvalidSampleRate(f64),
    /// Two frames handed to the direction estimator differ in size.
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// Frame has no pixels.
    EmptyFrame,
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientData { have, need } => write!(
                f,
                "insufficient data: intensity window has {} of {} samples",
                have, need
            ),
            Self::InvalidSampleRate(fps) => {
                write!(f, "sampling rate must be positive and finite, got {}", fps)
            }
            Self::DimensionMismatch { expected, actual } => write!(
                f,
                "frame dimension mismatch: expected {}x{}, got {}x{}",
                expected.0, expected.1, actual.0, actual.1
            ),
            Self::EmptyFrame => write!(f, "frame has no pixels"),
        }
    }
}

impl std::error::Error for AnalysisError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_errors_survive_anyhow_wrapping() {
        let err: anyhow::Error = AnalysisError::InsufficientData { have: 3, need: 8 }.into();
        let inner = err.downcast_ref::<AnalysisError>();
        assert_eq!(
            inner,
            Some(&AnalysisError::InsufficientData { have: 3, need: 8 })
        );
        assert!(err.to_string().contains("3 of 8"));
    }
}
