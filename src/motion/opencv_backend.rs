//! OpenCV-backed resize and Farnebäck flow, enabled by `flow-opencv`.
//!
//! Frames cross into OpenCV as owned `CV_8UC1` matrices. The flow output is
//! a `CV_32FC2` matrix read back into a `FlowField` in row-major order.

use anyhow::{anyhow, Context, Result};
use opencv::core::{self, Mat, Vec2f};
use opencv::prelude::*;
use opencv::{imgproc, video};

use crate::frame::GrayFrame;
use crate::motion::backend::FlowBackend;
use crate::motion::farneback::FarnebackParams;
use crate::motion::field::FlowField;

/// Farnebäck flow through `cv::calcOpticalFlowFarneback`.
#[derive(Clone, Debug, Default)]
pub struct OpencvFarnebackBackend {
    params: FarnebackParams,
}

impl OpencvFarnebackBackend {
    pub fn new(params: FarnebackParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &FarnebackParams {
        &self.params
    }
}

impl FlowBackend for OpencvFarnebackBackend {
    fn name(&self) -> &'static str {
        "opencv-farneback"
    }

    fn compute(&mut self, prev: &GrayFrame, next: &GrayFrame) -> Result<FlowField> {
        if prev.dimensions() != next.dimensions() {
            return Err(anyhow!(
                "flow frames differ in size: {:?} vs {:?}",
                prev.dimensions(),
                next.dimensions()
            ));
        }
        let (width, height) = prev.dimensions();
        if prev.is_empty() {
            return Ok(FlowField::zeros(width as usize, height as usize));
        }
        let prev_mat = gray_mat(prev)?;
        let next_mat = gray_mat(next)?;
        let mut flow = Mat::default();
        let p = &self.params;
        video::calc_optical_flow_farneback(
            &prev_mat,
            &next_mat,
            &mut flow,
            p.pyr_scale,
            p.levels as i32,
            p.winsize as i32,
            p.iterations as i32,
            p.poly_n as i32,
            p.poly_sigma,
            0,
        )
        .context("calcOpticalFlowFarneback failed")?;

        let vectors = flow
            .data_typed::<Vec2f>()
            .context("flow output is not CV_32FC2")?;
        let data = vectors.iter().flat_map(|v| [v[0], v[1]]).collect();
        Ok(FlowField::from_interleaved(
            width as usize,
            height as usize,
            data,
        ))
    }
}

/// Bilinear resize through `cv::resize` with `INTER_LINEAR`.
pub(crate) fn resize_gray(frame: &GrayFrame, width: u32, height: u32) -> Result<GrayFrame> {
    let src = gray_mat(frame)?;
    let mut dst = Mat::default();
    imgproc::resize(
        &src,
        &mut dst,
        core::Size::new(width as i32, height as i32),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )
    .context("cv::resize failed")?;
    GrayFrame::new(dst.data_bytes()?.to_vec(), width, height)
}

/// Gaussian smoothing through `cv::GaussianBlur` with reflect-101 borders.
pub(crate) fn blur_gray(frame: &GrayFrame, ksize: u32, sigma: f64) -> Result<GrayFrame> {
    let src = gray_mat(frame)?;
    let mut dst = Mat::default();
    imgproc::gaussian_blur(
        &src,
        &mut dst,
        core::Size::new(ksize as i32, ksize as i32),
        sigma,
        sigma,
        core::BORDER_REFLECT_101,
    )
    .context("cv::GaussianBlur failed")?;
    GrayFrame::new(dst.data_bytes()?.to_vec(), frame.width, frame.height)
}

fn gray_mat(frame: &GrayFrame) -> Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        frame.height as i32,
        frame.width as i32,
        core::CV_8UC1,
        core::Scalar::all(0.0),
    )?;
    mat.data_bytes_mut()?.copy_from_slice(frame.pixels());
    Ok(mat)
}
