use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::frame::GrayFrame;
use crate::motion::backend::{build_backend, FlowBackend, FlowBackendKind};
use crate::motion::farneback::{FarnebackBackend, FarnebackParams};
use crate::motion::field::FlowField;
use crate::AnalysisError;

/// Default noise floor, in pixels per frame.
pub const DEFAULT_MOTION_THRESHOLD: f64 = 1.0;

/// How the angles of moving pixels are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleAveraging {
    /// Angle of the summed unit vectors. Wraps correctly across 0°.
    #[default]
    Circular,
    /// Plain mean of the angle values in `[0, 2π)`.
    Arithmetic,
}

/// Outcome of one direction estimate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DirectionEstimate {
    /// Dominant direction in degrees within `[0, 360)`, measured from +x
    /// towards +y in image coordinates.
    Moving { degrees: f64, moving_pixels: usize },
    /// No pixel exceeded the noise floor, or the moving pixels cancel out.
    NoMotion,
}

impl DirectionEstimate {
    pub fn degrees(&self) -> Option<f64> {
        match self {
            DirectionEstimate::Moving { degrees, .. } => Some(*degrees),
            DirectionEstimate::NoMotion => None,
        }
    }

    pub fn is_moving(&self) -> bool {
        matches!(self, DirectionEstimate::Moving { .. })
    }
}

/// Dominant propagation direction between two consecutive frames.
pub struct DirectionEstimator {
    backend: Box<dyn FlowBackend>,
    threshold: f64,
    averaging: AngleAveraging,
}

impl DirectionEstimator {
    /// Estimator backed by the built-in Farnebäck flow.
    pub fn new(params: FarnebackParams, threshold: f64, averaging: AngleAveraging) -> Result<Self> {
        Ok(Self::with_backend(
            Box::new(FarnebackBackend::new(params)?),
            threshold,
            averaging,
        ))
    }

    /// Estimator backed by the flow implementation selected by `kind`.
    pub fn with_kind(
        kind: FlowBackendKind,
        params: FarnebackParams,
        threshold: f64,
        averaging: AngleAveraging,
    ) -> Result<Self> {
        Ok(Self::with_backend(
            build_backend(kind, params)?,
            threshold,
            averaging,
        ))
    }

    pub fn with_backend(
        backend: Box<dyn FlowBackend>,
        threshold: f64,
        averaging: AngleAveraging,
    ) -> Self {
        Self {
            backend,
            threshold,
            averaging,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn averaging(&self) -> AngleAveraging {
        self.averaging
    }

    /// Estimate the direction of motion from `prev` to `next`.
    ///
    /// Both frames must already share the reduced analysis resolution.
    pub fn estimate(&mut self, prev: &GrayFrame, next: &GrayFrame) -> Result<DirectionEstimate> {
        if prev.dimensions() != next.dimensions() {
            return Err(AnalysisError::DimensionMismatch {
                expected: prev.dimensions(),
                actual: next.dimensions(),
            }
            .into());
        }
        if prev.is_empty() {
            return Err(AnalysisError::EmptyFrame.into());
        }
        let flow = self.backend.compute(prev, next)?;
        let estimate = direction_from_flow(&flow, self.threshold, self.averaging);
        log::debug!(
            "direction backend={} estimate={:?}",
            self.backend.name(),
            estimate
        );
        Ok(estimate)
    }
}

/// Reduce a motion field to one direction, ignoring vectors whose magnitude
/// is at or below `threshold`.
pub fn direction_from_flow(
    flow: &FlowField,
    threshold: f64,
    averaging: AngleAveraging,
) -> DirectionEstimate {
    let mut count = 0usize;
    let mut sum_angle = 0.0f64;
    let mut sum_cos = 0.0f64;
    let mut sum_sin = 0.0f64;
    for (mag, ang) in flow.polar() {
        if (mag as f64) <= threshold || !mag.is_finite() || !ang.is_finite() {
            continue;
        }
        let ang = ang as f64;
        count += 1;
        sum_angle += ang;
        sum_cos += ang.cos();
        sum_sin += ang.sin();
    }
    if count == 0 {
        return DirectionEstimate::NoMotion;
    }

    let radians = match averaging {
        AngleAveraging::Arithmetic => sum_angle / count as f64,
        AngleAveraging::Circular => {
            let resultant = sum_cos.hypot(sum_sin) / count as f64;
            if resultant < 1e-6 {
                return DirectionEstimate::NoMotion;
            }
            sum_sin.atan2(sum_cos)
        }
    };
    DirectionEstimate::Moving {
        degrees: normalize_degrees(radians.to_degrees()),
        moving_pixels: count,
    }
}

fn normalize_degrees(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}
