//! Spectrum types and the band-centroid rule shared by both estimators.

use anyhow::{anyhow, Result};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Which axis a spectrum was taken over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Over time, bins in Hz.
    Temporal,
    /// Along one frame row, bins in cycles per frame width.
    Spatial,
}

impl Domain {
    pub fn unit(&self) -> &'static str {
        match self {
            Domain::Temporal => "Hz",
            Domain::Spatial => "cyc/w",
        }
    }
}

/// Magnitude spectrum: ascending non-negative bins with non-negative magnitudes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub domain: Domain,
    pub frequencies: Vec<f64>,
    pub magnitudes: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// `(frequency, magnitude)` pairs in ascending frequency order.
    pub fn bins(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.frequencies
            .iter()
            .copied()
            .zip(self.magnitudes.iter().copied())
    }

    /// Strongest bin above DC, if any carries energy.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.bins()
            .filter(|&(f, m)| f > 0.0 && m > 0.0)
            .fold(None, |best: Option<(f64, f64)>, bin| match best {
                Some(b) if b.1 >= bin.1 => Some(b),
                _ => Some(bin),
            })
    }

    /// Centroid of this spectrum within `band`.
    pub fn centroid(&self, band: &Band) -> BandCentroid {
        BandCentroid {
            label: band.label.clone(),
            value: band_centroid(&self.frequencies, &self.magnitudes, band.min, band.max),
        }
    }
}

/// Labelled frequency interval with a display color.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub label: String,
    pub min: f64,
    pub max: f64,
    /// RGB display color, shown by `LogPresenter` next to the band value.
    #[serde(default = "default_band_color")]
    pub color: [u8; 3],
}

fn default_band_color() -> [u8; 3] {
    [128, 128, 128]
}

const LOW_COLOR: [u8; 3] = [200, 80, 40];
const MID_COLOR: [u8; 3] = [60, 160, 60];
const HIGH_COLOR: [u8; 3] = [60, 80, 200];

impl Band {
    pub fn new(label: impl Into<String>, min: f64, max: f64, color: [u8; 3]) -> Self {
        Self {
            label: label.into(),
            min,
            max,
            color,
        }
    }

    /// Closed-interval membership.
    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.min && freq <= self.max
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(anyhow!("band label must not be empty"));
        }
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(anyhow!("band {} has non-finite bounds", self.label));
        }
        if self.min < 0.0 {
            return Err(anyhow!("band {} must start at or above 0", self.label));
        }
        if self.min >= self.max {
            return Err(anyhow!(
                "band {} must satisfy min < max (got {} >= {})",
                self.label,
                self.min,
                self.max
            ));
        }
        Ok(())
    }

    /// Temporal bands in Hz: low 0.1–0.5, mid 0.5–2.0, high 2.0–5.0.
    pub fn default_temporal() -> Vec<Band> {
        vec![
            Band::new("low", 0.1, 0.5, LOW_COLOR),
            Band::new("mid", 0.5, 2.0, MID_COLOR),
            Band::new("high", 2.0, 5.0, HIGH_COLOR),
        ]
    }

    /// Spatial bands in cycles per frame width: low 0.5–3, mid 3–8, high 8–20.
    pub fn default_spatial() -> Vec<Band> {
        vec![
            Band::new("low", 0.5, 3.0, LOW_COLOR),
            Band::new("mid", 3.0, 8.0, MID_COLOR),
            Band::new("high", 8.0, 20.0, HIGH_COLOR),
        ]
    }
}

/// Magnitude-weighted mean frequency of one band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandCentroid {
    pub label: String,
    pub value: f64,
}

/// One estimator call's output: the full spectrum plus one centroid per band.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectralSummary {
    pub spectrum: Spectrum,
    pub centroids: Vec<BandCentroid>,
}

impl SpectralSummary {
    pub(crate) fn from_spectrum(spectrum: Spectrum, bands: &[Band]) -> Self {
        let centroids = bands.iter().map(|b| spectrum.centroid(b)).collect();
        Self {
            spectrum,
            centroids,
        }
    }

    pub fn domain(&self) -> Domain {
        self.spectrum.domain
    }

    /// Centroid for `label`, 0.0 when the band is not configured.
    pub fn centroid(&self, label: &str) -> f64 {
        self.centroids
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.value)
            .unwrap_or(0.0)
    }
}

/// Relative rounding floor for DFT magnitudes.
const NOISE_FLOOR: f64 = 1e-12;

/// `|DFT|` of the de-meaned `signal`, `len / 2 + 1` bins.
///
/// Bin `k` corresponds to `k` cycles per window; callers scale to their unit.
/// Non-finite inputs are treated as 0 and non-finite outputs are replaced by 0.
/// Magnitudes are `|X_k|` except at rounding-noise level: anything at or below
/// `max|x| * len * 1e-12` is flushed to 0. Without the flush a constant window
/// leaves FFT round-off in every bin, and the band centroid of that noise is an
/// arbitrary in-band frequency instead of the 0.0 a degenerate signal must
/// report. At 8-bit intensity scales the floor sits far below one quantum.
pub(crate) fn magnitude_spectrum(
    planner: &mut RealFftPlanner<f64>,
    signal: &[f64],
) -> Result<Vec<f64>> {
    let n = signal.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let clean: Vec<f64> = signal
        .iter()
        .map(|&v| if v.is_finite() { v } else { 0.0 })
        .collect();
    let mean = clean.iter().sum::<f64>() / n as f64;
    let floor = clean.iter().fold(0.0f64, |acc, v| acc.max(v.abs())) * n as f64 * NOISE_FLOOR;
    if n < 2 {
        return Ok(vec![0.0]);
    }

    let r2c = planner.plan_fft_forward(n);
    let mut input = r2c.make_input_vec();
    for (dst, &v) in input.iter_mut().zip(&clean) {
        *dst = v - mean;
    }
    let mut output = r2c.make_output_vec();
    r2c.process(&mut input, &mut output)
        .map_err(|e| anyhow!("real FFT of {} samples failed: {:?}", n, e))?;
    Ok(output
        .iter()
        .map(|c| sanitize(c.norm()))
        .map(|m| if m <= floor { 0.0 } else { m })
        .collect())
}

/// Magnitude-weighted mean of `frequencies` within `[min, max]`.
///
/// Returns 0.0 when no bin falls in the band or the band carries no energy.
pub fn band_centroid(frequencies: &[f64], magnitudes: &[f64], min: f64, max: f64) -> f64 {
    let mut weighted = 0.0f64;
    let mut total = 0.0f64;
    for (&f, &m) in frequencies.iter().zip(magnitudes) {
        if !f.is_finite() || !m.is_finite() || f < min || f > max {
            continue;
        }
        weighted += f * m;
        total += m;
    }
    if total <= 0.0 {
        return 0.0;
    }
    sanitize(weighted / total)
}

pub(crate) fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn constant_signal_has_no_energy() -> Result<()> {
        let mut planner = RealFftPlanner::new();
        let mags = magnitude_spectrum(&mut planner, &[7.5; 16])?;
        assert_eq!(mags.len(), 9);
        assert!(mags.iter().all(|&m| m == 0.0));
        let mags = magnitude_spectrum(&mut planner, &[0.1; 30])?;
        assert!(mags.iter().all(|&m| m == 0.0));
        Ok(())
    }

    #[test]
    fn faint_signal_above_the_floor_is_kept() -> Result<()> {
        let mut planner = RealFftPlanner::new();
        let signal: Vec<f64> = (0..8)
            .map(|i| if i % 2 == 0 { 255.0 } else { 255.001 })
            .collect();
        let mags = magnitude_spectrum(&mut planner, &signal)?;
        assert_abs_diff_eq!(mags[4], 0.004, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn alternating_signal_peaks_at_nyquist() -> Result<()> {
        let mut planner = RealFftPlanner::new();
        let mags = magnitude_spectrum(&mut planner, &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0])?;
        // De-meaned ±0.5 over 8 samples: |X[4]| = 8 * 0.5.
        assert_abs_diff_eq!(mags[4], 4.0, epsilon = 1e-9);
        assert!(mags[..4].iter().all(|&m| m < 1e-9));
        Ok(())
    }

    #[test]
    fn degenerate_lengths_are_defined() -> Result<()> {
        let mut planner = RealFftPlanner::new();
        assert!(magnitude_spectrum(&mut planner, &[])?.is_empty());
        assert_eq!(magnitude_spectrum(&mut planner, &[42.0])?, vec![0.0]);
        let mags = magnitude_spectrum(&mut planner, &[f64::NAN, 1.0, f64::INFINITY])?;
        assert!(mags.iter().all(|m| m.is_finite()));
        Ok(())
    }

    #[test]
    fn centroid_uses_closed_interval() {
        let freqs = [0.0, 0.5, 1.0, 1.5, 2.0];
        let mags = [9.0, 1.0, 0.0, 0.0, 3.0];
        assert_abs_diff_eq!(band_centroid(&freqs, &mags, 0.5, 2.0), 1.625);
        assert_eq!(band_centroid(&freqs, &mags, 1.0, 1.5), 0.0);
        assert_eq!(band_centroid(&freqs, &mags, 10.0, 20.0), 0.0);
    }

    #[test]
    fn band_validation() {
        assert!(Band::new("x", 1.0, 1.0, [0; 3]).validate().is_err());
        assert!(Band::new("x", -1.0, 1.0, [0; 3]).validate().is_err());
        assert!(Band::new("x", 0.0, f64::INFINITY, [0; 3]).validate().is_err());
        assert!(Band::default_temporal().iter().all(|b| b.validate().is_ok()));
    }

    #[test]
    fn peak_skips_dc() {
        let spectrum = Spectrum {
            domain: Domain::Temporal,
            frequencies: vec![0.0, 1.0, 2.0],
            magnitudes: vec![100.0, 3.0, 5.0],
        };
        assert_eq!(spectrum.peak(), Some((2.0, 5.0)));
    }
}
