use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::GrayFrame;
use crate::motion::farneback::{FarnebackBackend, FarnebackParams};
use crate::motion::field::FlowField;

/// Dense motion backend.
///
/// Implementations compute one displacement vector per pixel of `prev` such
/// that `prev(x, y)` is found near `next(x + dx, y + dy)`. Both frames are
/// guaranteed by the caller to have identical dimensions.
pub trait FlowBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Compute the motion field between two consecutive frames.
    fn compute(&mut self, prev: &GrayFrame, next: &GrayFrame) -> Result<FlowField>;
}

/// Selectable flow implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowBackendKind {
    /// Built-in CPU port.
    Farneback,
    /// `cv::calcOpticalFlowFarneback`, requires the `flow-opencv` feature.
    Opencv,
}

impl Default for FlowBackendKind {
    fn default() -> Self {
        if cfg!(feature = "flow-opencv") {
            FlowBackendKind::Opencv
        } else {
            FlowBackendKind::Farneback
        }
    }
}

impl FlowBackendKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "farneback" => Ok(FlowBackendKind::Farneback),
            "opencv" => Ok(FlowBackendKind::Opencv),
            other => Err(anyhow!(
                "unknown flow backend {:?} (expected farneback or opencv)",
                other
            )),
        }
    }

    pub fn is_available(self) -> bool {
        match self {
            FlowBackendKind::Farneback => true,
            FlowBackendKind::Opencv => cfg!(feature = "flow-opencv"),
        }
    }
}

/// Instantiate the backend for `kind`.
pub fn build_backend(kind: FlowBackendKind, params: FarnebackParams) -> Result<Box<dyn FlowBackend>> {
    match kind {
        FlowBackendKind::Farneback => Ok(Box::new(FarnebackBackend::new(params)?)),
        #[cfg(feature = "flow-opencv")]
        FlowBackendKind::Opencv => Ok(Box::new(
            crate::motion::opencv_backend::OpencvFarnebackBackend::new(params)?,
        )),
        #[cfg(not(feature = "flow-opencv"))]
        FlowBackendKind::Opencv => Err(anyhow!(
            "flow backend opencv requires building with --features flow-opencv"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parsing() -> Result<()> {
        assert_eq!(FlowBackendKind::parse(" OpenCV ")?, FlowBackendKind::Opencv);
        assert_eq!(FlowBackendKind::parse("farneback")?, FlowBackendKind::Farneback);
        assert!(FlowBackendKind::parse("lucas-kanade").is_err());
        Ok(())
    }

    #[test]
    fn default_kind_is_always_buildable() -> Result<()> {
        let kind = FlowBackendKind::default();
        assert!(kind.is_available());
        let backend = build_backend(kind, FarnebackParams::default())?;
        let expected = if cfg!(feature = "flow-opencv") {
            "opencv-farneback"
        } else {
            "farneback"
        };
        assert_eq!(backend.name(), expected);
        Ok(())
    }

    #[cfg(not(feature = "flow-opencv"))]
    #[test]
    fn opencv_kind_needs_the_feature() {
        assert!(!FlowBackendKind::Opencv.is_available());
        assert!(build_backend(FlowBackendKind::Opencv, FarnebackParams::default()).is_err());
    }
}
