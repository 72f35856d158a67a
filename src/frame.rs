//! Frame containers.
//!
//! - `ColorFrame`: packed RGB24 pixels as delivered by an ingest source.
//! - `GrayFrame`: single-channel luminance grid used by every estimator.
//! - `FramePair`: the (color, grayscale) pair produced once per acquisition step.
//!
//! Frames are immutable after construction. Pixel storage is private; callers
//! read through accessors so no component can mutate a frame another one is
//! still looking at.

use anyhow::{anyhow, Result};

#[cfg(not(feature = "flow-opencv"))]
use crate::motion::imgproc;

// ----------------------------------------------------------------------------
// ColorFrame
// ----------------------------------------------------------------------------

/// Packed RGB24 frame.
#[derive(Clone, Debug)]
pub struct ColorFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ColorFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = pixel_count(width, height)?
            .checked_mul(3)
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// ITU-R BT.601 luma, rounded to the nearest integer.
    pub fn to_gray(&self) -> GrayFrame {
        let data = self
            .data
            .chunks_exact(3)
            .map(|px| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                clamp_to_u8(y)
            })
            .collect();
        GrayFrame {
            data,
            width: self.width,
            height: self.height,
        }
    }
}

// ----------------------------------------------------------------------------
// GrayFrame
// ----------------------------------------------------------------------------

/// Single-channel 8-bit luminance frame.
#[derive(Clone, Debug, PartialEq)]
pub struct GrayFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = pixel_count(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "gray frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Build a frame by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> u8) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Luminance as `f32`, row-major.
    pub fn to_f32(&self) -> Vec<f32> {
        self.data.iter().map(|&p| p as f32).collect()
    }

    /// Bilinear resize with pixel-center alignment.
    pub fn resize(&self, width: u32, height: u32) -> Result<GrayFrame> {
        if self.is_empty() {
            return Err(crate::AnalysisError::EmptyFrame.into());
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("resize target must be non-empty"));
        }
        if (width, height) == self.dimensions() {
            return Ok(self.clone());
        }
        #[cfg(feature = "flow-opencv")]
        {
            crate::motion::opencv_backend::resize_gray(self, width, height)
        }
        #[cfg(not(feature = "flow-opencv"))]
        {
            let resized = imgproc::resize_linear(
                &self.to_f32(),
                self.width as usize,
                self.height as usize,
                width as usize,
                height as usize,
            );
            Ok(GrayFrame {
                data: resized.into_iter().map(clamp_to_u8).collect(),
                width,
                height,
            })
        }
    }

    /// Gaussian blur with an odd `ksize` and reflect-101 borders. A
    /// non-positive `sigma` is derived from the kernel size.
    pub fn blur(&self, ksize: u32, sigma: f64) -> Result<GrayFrame> {
        if ksize == 0 || ksize % 2 == 0 {
            return Err(anyhow!("blur kernel size must be odd, got {}", ksize));
        }
        if self.is_empty() {
            return Ok(self.clone());
        }
        #[cfg(feature = "flow-opencv")]
        {
            crate::motion::opencv_backend::blur_gray(self, ksize, sigma)
        }
        #[cfg(not(feature = "flow-opencv"))]
        {
            let blurred = imgproc::gaussian_blur(
                &self.to_f32(),
                self.width as usize,
                self.height as usize,
                ksize as usize,
                sigma,
            );
            Ok(GrayFrame {
                data: blurred.into_iter().map(clamp_to_u8).collect(),
                width: self.width,
                height: self.height,
            })
        }
    }

    /// Mean luminance of rows `[row_start, row_end)` across the full width.
    ///
    /// The row range is clamped into the frame so a short frame still yields a
    /// sample from its bottom rows instead of an empty mean. Returns 0.0 for an
    /// empty frame.
    pub fn strip_mean(&self, row_start: u32, row_end: u32) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let (start, end) = clamp_rows(row_start, row_end, self.height);
        let w = self.width as usize;
        let strip = &self.data[start * w..end * w];
        let sum: u64 = strip.iter().map(|&p| p as u64).sum();
        sum as f64 / strip.len() as f64
    }

    /// One row at the vertical midpoint, or the column-wise mean of a strip of
    /// `strip_rows` rows centered on it.
    pub fn mid_row(&self, strip_rows: u32) -> Vec<f64> {
        if self.is_empty() {
            return Vec::new();
        }
        let rows = strip_rows.clamp(1, self.height);
        let mid = self.height / 2;
        let start = mid.saturating_sub(rows / 2).min(self.height - rows);
        let w = self.width as usize;
        let mut out = vec![0.0f64; w];
        for y in start..start + rows {
            let row = &self.data[y as usize * w..(y as usize + 1) * w];
            for (acc, &p) in out.iter_mut().zip(row) {
                *acc += p as f64;
            }
        }
        let scale = 1.0 / rows as f64;
        out.iter_mut().for_each(|v| *v *= scale);
        out
    }
}

// ----------------------------------------------------------------------------
// FramePair
// ----------------------------------------------------------------------------

/// Color frame plus its grayscale rendition, produced once per acquisition step.
#[derive(Clone, Debug)]
pub struct FramePair {
    /// Kept for presenters that draw over the camera image; analysis reads
    /// only `gray`.
    pub color: ColorFrame,
    pub gray: GrayFrame,
}

impl FramePair {
    pub fn from_color(color: ColorFrame) -> Self {
        let gray = color.to_gray();
        Self { color, gray }
    }

    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        Ok(Self::from_color(ColorFrame::new(pixels, width, height)?))
    }

    /// Build a pair from a grayscale frame, replicating luma into all three channels.
    pub fn from_gray(gray: GrayFrame) -> Self {
        let data = gray.pixels().iter().flat_map(|&p| [p, p, p]).collect();
        let color = ColorFrame {
            data,
            width: gray.width,
            height: gray.height,
        };
        Self { color, gray }
    }
}

fn pixel_count(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn clamp_rows(row_start: u32, row_end: u32, height: u32) -> (usize, usize) {
    let start = row_start.min(height - 1);
    let end = row_end.max(start + 1).min(height);
    (start as usize, end as usize)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
