//! Motion-direction estimation over dense optical flow.

mod backend;
mod direction;
mod farneback;
mod field;
pub(crate) mod imgproc;
#[cfg(feature = "flow-opencv")]
pub(crate) mod opencv_backend;

pub use backend::{build_backend, FlowBackend, FlowBackendKind};
pub use direction::{
    direction_from_flow, AngleAveraging, DirectionEstimate, DirectionEstimator,
    DEFAULT_MOTION_THRESHOLD,
};
pub use farneback::{FarnebackBackend, FarnebackParams};
pub use field::FlowField;
#[cfg(feature = "flow-opencv")]
pub use opencv_backend::OpencvFarnebackBackend;
