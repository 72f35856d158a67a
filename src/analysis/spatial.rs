use anyhow::Result;
use realfft::RealFftPlanner;

use crate::analysis::spectrum::{
    band_centroid, magnitude_spectrum, sanitize, Band, BandCentroid, Domain, SpectralSummary,
    Spectrum,
};
use crate::frame::GrayFrame;
use crate::AnalysisError;

/// Band centroids of brightness variation along the middle row of one frame,
/// in cycles per frame width. Stateless between frames and independent of
/// the frame rate.
pub struct SpatialSpectrumEstimator {
    bands: Vec<Band>,
    strip_rows: u32,
    planner: RealFftPlanner<f64>,
}

impl SpatialSpectrumEstimator {
    /// `strip_rows` rows around the vertical midpoint are averaged into the
    /// analysed row (1 = the midpoint row alone).
    pub fn new(bands: Vec<Band>, strip_rows: u32) -> Self {
        Self {
            bands,
            strip_rows: strip_rows.max(1),
            planner: RealFftPlanner::new(),
        }
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn estimate(&mut self, frame: &GrayFrame) -> Result<SpectralSummary> {
        if frame.is_empty() {
            return Err(AnalysisError::EmptyFrame.into());
        }
        let row = frame.mid_row(self.strip_rows);
        let width = row.len() as f64;
        let magnitudes: Vec<f64> = magnitude_spectrum(&mut self.planner, &row)?
            .into_iter()
            .map(sanitize)
            .collect();

        // Bin k sits at k / W cycles per pixel; bands are matched in that unit
        // and the centroid is scaled back to cycles per frame width.
        let per_pixel: Vec<f64> = (0..magnitudes.len())
            .map(|k| sanitize(k as f64 / width))
            .collect();
        let centroids = self
            .bands
            .iter()
            .map(|band| {
                let (lo, hi) = band_in_cycles_per_pixel(band, row.len() as u32);
                BandCentroid {
                    label: band.label.clone(),
                    value: sanitize(band_centroid(&per_pixel, &magnitudes, lo, hi) * width),
                }
            })
            .collect();
        let spectrum = Spectrum {
            domain: Domain::Spatial,
            frequencies: (0..magnitudes.len()).map(|k| k as f64).collect(),
            magnitudes,
        };
        Ok(SpectralSummary {
            spectrum,
            centroids,
        })
    }
}

impl Default for SpatialSpectrumEstimator {
    fn default() -> Self {
        Self::new(Band::default_spatial(), 1)
    }
}

/// Per-pixel interval `[min / W, max / W]` equivalent to a band given in
/// cycles per frame width.
pub fn band_in_cycles_per_pixel(band: &Band, width: u32) -> (f64, f64) {
    if width == 0 {
        return (0.0, 0.0);
    }
    let w = width as f64;
    (band.min / w, band.max / w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::TAU;

    fn stripes(width: u32, cycles: f64) -> GrayFrame {
        GrayFrame::from_fn(width, 9, |x, _| {
            let v = 128.0 + 60.0 * (TAU * cycles * x as f64 / width as f64).cos();
            v.round() as u8
        })
    }

    #[test]
    fn constant_frame_has_zero_centroids() -> Result<()> {
        let frame = GrayFrame::from_fn(64, 4, |_, _| 0);
        let summary = SpatialSpectrumEstimator::default().estimate(&frame)?;
        assert!(summary.centroids.iter().all(|c| c.value == 0.0));
        assert!(summary.spectrum.magnitudes.iter().all(|m| m.is_finite()));
        Ok(())
    }

    #[test]
    fn single_pixel_wide_frame_is_finite() -> Result<()> {
        let frame = GrayFrame::from_fn(1, 5, |_, y| y as u8);
        let summary = SpatialSpectrumEstimator::default().estimate(&frame)?;
        assert_eq!(summary.spectrum.frequencies, vec![0.0]);
        assert_eq!(summary.spectrum.magnitudes, vec![0.0]);
        Ok(())
    }

    #[test]
    fn stripes_land_in_mid_band() -> Result<()> {
        let summary = SpatialSpectrumEstimator::default().estimate(&stripes(160, 5.0))?;
        assert_abs_diff_eq!(summary.centroid("mid"), 5.0, epsilon = 0.05);
        Ok(())
    }

    #[test]
    fn empty_frame_is_rejected() {
        let frame = GrayFrame::from_fn(0, 0, |_, _| 0);
        assert!(SpatialSpectrumEstimator::default().estimate(&frame).is_err());
    }

    #[test]
    fn band_edges_are_inclusive_at_any_width() -> Result<()> {
        // Exactly 3 and 8 cycles per width sit on the mid band edges.
        for width in [48, 64, 96, 100] {
            let mut estimator =
                SpatialSpectrumEstimator::new(vec![Band::new("mid", 3.0, 8.0, [0; 3])], 1);
            let lower = estimator.estimate(&stripes(width, 3.0))?;
            assert_abs_diff_eq!(lower.centroid("mid"), 3.0, epsilon = 0.05);
            let upper = estimator.estimate(&stripes(width, 8.0))?;
            assert_abs_diff_eq!(upper.centroid("mid"), 8.0, epsilon = 0.05);
        }
        Ok(())
    }

    #[test]
    fn per_pixel_band_scales_with_width() {
        let band = Band::new("mid", 3.0, 8.0, [0; 3]);
        assert_eq!(band_in_cycles_per_pixel(&band, 100), (0.03, 0.08));
        assert_eq!(band_in_cycles_per_pixel(&band, 0), (0.0, 0.0));
    }
}
