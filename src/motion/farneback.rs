//! Pyramidal dense optical flow after Farnebäck (2003).
//!
//! Each pyramid level approximates the neighbourhood of every pixel with a
//! quadratic polynomial `f(p) ≈ pᵀAp + bᵀp + c` (polynomial expansion), then
//! solves for the displacement that best maps the expansion of the previous
//! frame onto the next one, averaging the normal equations over a box window.
//! Coarse levels seed the finer ones.
//!
//! Polynomial coefficient planes hold five interleaved values per pixel in the
//! order `[b_y, b_x, a_yy, a_xx, a_xy]`.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::frame::GrayFrame;
use crate::motion::backend::FlowBackend;
use crate::motion::field::FlowField;
use crate::motion::imgproc::{box_blur_channels, gaussian_blur, resize_linear, resize_linear_channels};

/// Levels below this size (in either dimension) are not built.
const MIN_LEVEL_SIZE: f64 = 32.0;

/// Pixels closer than this to the border get down-weighted constraints.
const BORDER: usize = 5;
const BORDER_WEIGHTS: [f32; BORDER] = [0.14, 0.14, 0.4472, 0.4472, 0.4472];

/// Fixed flow parameter set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FarnebackParams {
    /// Scale between consecutive pyramid levels, in (0, 1).
    pub pyr_scale: f64,
    /// Number of coarser levels to build on top of the input resolution.
    pub levels: u32,
    /// Side of the averaging window, odd.
    pub winsize: u32,
    /// Refinement iterations per level.
    pub iterations: u32,
    /// Half-size of the polynomial expansion neighbourhood.
    pub poly_n: u32,
    /// Gaussian sigma weighting the polynomial fit.
    pub poly_sigma: f64,
}

impl Default for FarnebackParams {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            winsize: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

impl FarnebackParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.pyr_scale > 0.0 && self.pyr_scale < 1.0) {
            return Err(anyhow!("flow pyr_scale must be in (0, 1)"));
        }
        if self.levels == 0 {
            return Err(anyhow!("flow levels must be >= 1"));
        }
        if self.winsize == 0 || self.winsize % 2 == 0 {
            return Err(anyhow!("flow winsize must be odd and >= 1"));
        }
        if self.iterations == 0 {
            return Err(anyhow!("flow iterations must be >= 1"));
        }
        if self.poly_n == 0 {
            return Err(anyhow!("flow poly_n must be >= 1"));
        }
        if !(self.poly_sigma > 0.0 && self.poly_sigma.is_finite()) {
            return Err(anyhow!("flow poly_sigma must be positive"));
        }
        Ok(())
    }
}

/// CPU Farnebäck backend.
#[derive(Clone, Debug, Default)]
pub struct FarnebackBackend {
    params: FarnebackParams,
}

impl FarnebackBackend {
    pub fn new(params: FarnebackParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &FarnebackParams {
        &self.params
    }
}

impl FlowBackend for FarnebackBackend {
    fn name(&self) -> &'static str {
        "farneback"
    }

    fn compute(&mut self, prev: &GrayFrame, next: &GrayFrame) -> Result<FlowField> {
        if prev.dimensions() != next.dimensions() {
            return Err(crate::AnalysisError::DimensionMismatch {
                expected: prev.dimensions(),
                actual: next.dimensions(),
            }
            .into());
        }
        if prev.is_empty() {
            return Err(crate::AnalysisError::EmptyFrame.into());
        }
        let w = prev.width as usize;
        let h = prev.height as usize;
        let data = calc_flow(&prev.to_f32(), &next.to_f32(), w, h, &self.params);
        Ok(FlowField::from_interleaved(w, h, data))
    }
}

fn calc_flow(prev: &[f32], next: &[f32], w: usize, h: usize, p: &FarnebackParams) -> Vec<f32> {
    let kernel = PolyKernel::new(p.poly_n as usize, p.poly_sigma);

    let mut top = 0u32;
    let mut scale = 1.0f64;
    while top < p.levels {
        scale *= p.pyr_scale;
        if (w as f64) * scale < MIN_LEVEL_SIZE || (h as f64) * scale < MIN_LEVEL_SIZE {
            break;
        }
        top += 1;
    }

    let mut prev_flow: Option<(Vec<f32>, usize, usize)> = None;
    for k in (0..=top).rev() {
        let scale = p.pyr_scale.powi(k as i32);
        let sigma = (1.0 / scale - 1.0) * 0.5;
        let smooth_sz = (((sigma * 5.0).round() as usize) | 1).max(3);
        let lw = ((w as f64 * scale).round() as usize).max(1);
        let lh = ((h as f64 * scale).round() as usize).max(1);

        let mut flow = match prev_flow.take() {
            Some((pf, pw, ph)) => {
                let mut up = resize_linear_channels(&pf, pw, ph, lw, lh, 2);
                let gain = (1.0 / p.pyr_scale) as f32;
                up.iter_mut().for_each(|v| *v *= gain);
                up
            }
            None => vec![0.0f32; lw * lh * 2],
        };

        let r0 = expand_level(prev, w, h, lw, lh, smooth_sz, sigma, &kernel);
        let r1 = expand_level(next, w, h, lw, lh, smooth_sz, sigma, &kernel);

        let mut m = update_matrices(&r0, &r1, &flow, lw, lh);
        for i in 0..p.iterations {
            let refresh = i + 1 < p.iterations;
            update_flow(&r0, &r1, &mut flow, &mut m, lw, lh, p.winsize as usize, refresh);
        }
        prev_flow = Some((flow, lw, lh));
    }

    prev_flow.map(|(flow, _, _)| flow).unwrap_or_default()
}

#[allow(clippy::too_many_arguments)]
fn expand_level(
    img: &[f32],
    w: usize,
    h: usize,
    lw: usize,
    lh: usize,
    smooth_sz: usize,
    sigma: f64,
    kernel: &PolyKernel,
) -> Vec<f32> {
    let blurred = gaussian_blur(img, w, h, smooth_sz, sigma);
    let level = if (lw, lh) == (w, h) {
        blurred
    } else {
        resize_linear(&blurred, w, h, lw, lh)
    };
    poly_expansion(&level, lw, lh, kernel)
}

// ----------------------------------------------------------------------------
// Polynomial expansion
// ----------------------------------------------------------------------------

/// Separable Gaussian applicability and the entries of the inverse Gram matrix
/// needed to turn filter responses into polynomial coefficients.
struct PolyKernel {
    n: usize,
    g: Vec<f32>,
    xg: Vec<f32>,
    xxg: Vec<f32>,
    ig11: f32,
    ig03: f32,
    ig33: f32,
    ig55: f32,
}

impl PolyKernel {
    fn new(n: usize, sigma: f64) -> Self {
        let raw: Vec<f64> = (0..=n)
            .map(|x| (-((x * x) as f64) / (2.0 * sigma * sigma)).exp())
            .collect();
        let total: f64 = raw[0] + 2.0 * raw[1..].iter().sum::<f64>();
        let g: Vec<f64> = raw.iter().map(|v| v / total).collect();

        // Moments of the 2-D applicability over the basis {1, x, y, x², y², xy}.
        let mut s0 = 0.0;
        let mut s11 = 0.0;
        let mut s33 = 0.0;
        let mut s55 = 0.0;
        let ni = n as isize;
        for y in -ni..=ni {
            for x in -ni..=ni {
                let w = g[y.unsigned_abs()] * g[x.unsigned_abs()];
                let (xf, yf) = (x as f64, y as f64);
                s0 += w;
                s11 += w * xf * xf;
                s33 += w * xf * xf * xf * xf;
                s55 += w * xf * xf * yf * yf;
            }
        }
        let inv = invert3([[s0, s11, s11], [s11, s33, s55], [s11, s55, s33]]);

        Self {
            n,
            g: g.iter().map(|&v| v as f32).collect(),
            xg: g.iter().enumerate().map(|(x, &v)| (x as f64 * v) as f32).collect(),
            xxg: g
                .iter()
                .enumerate()
                .map(|(x, &v)| ((x * x) as f64 * v) as f32)
                .collect(),
            ig11: (1.0 / s11) as f32,
            ig03: inv[0][1] as f32,
            ig33: inv[1][1] as f32,
            ig55: (1.0 / s55) as f32,
        }
    }
}

fn invert3(m: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let c00 = m[1][1] * m[2][2] - m[1][2] * m[2][1];
    let c01 = m[1][2] * m[2][0] - m[1][0] * m[2][2];
    let c02 = m[1][0] * m[2][1] - m[1][1] * m[2][0];
    let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
    let id = 1.0 / det;
    [
        [
            c00 * id,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * id,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * id,
        ],
        [
            c01 * id,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * id,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * id,
        ],
        [
            c02 * id,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * id,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * id,
        ],
    ]
}

fn poly_expansion(src: &[f32], w: usize, h: usize, k: &PolyKernel) -> Vec<f32> {
    let n = k.n;
    let mut dst = vec![0.0f32; w * h * 5];
    // Vertical responses (g, y·g, y²·g) per column, padded by n on each side.
    let mut row = vec![0.0f32; (w + 2 * n) * 3];

    for y in 0..h {
        let srow = &src[y * w..(y + 1) * w];
        for (x, &v) in srow.iter().enumerate() {
            let c = (x + n) * 3;
            row[c] = v * k.g[0];
            row[c + 1] = 0.0;
            row[c + 2] = 0.0;
        }
        for d in 1..=n {
            let up = &src[y.saturating_sub(d) * w..][..w];
            let down = &src[(y + d).min(h - 1) * w..][..w];
            for x in 0..w {
                let c = (x + n) * 3;
                let sum = up[x] + down[x];
                row[c] += k.g[d] * sum;
                row[c + 1] += k.xg[d] * (down[x] - up[x]);
                row[c + 2] += k.xxg[d] * sum;
            }
        }
        for x in 0..n {
            for c in 0..3 {
                row[x * 3 + c] = row[n * 3 + c];
                row[(w + n + x) * 3 + c] = row[(w + n - 1) * 3 + c];
            }
        }

        for x in 0..w {
            let c = (x + n) * 3;
            let g0 = k.g[0];
            let mut b1 = row[c] * g0;
            let mut b2 = 0.0f32;
            let mut b3 = row[c + 1] * g0;
            let mut b4 = 0.0f32;
            let mut b5 = row[c + 2] * g0;
            let mut b6 = 0.0f32;
            for d in 1..=n {
                let l = c - d * 3;
                let r = c + d * 3;
                let tg = row[r] + row[l];
                b1 += tg * k.g[d];
                b4 += tg * k.xxg[d];
                b2 += (row[r] - row[l]) * k.xg[d];
                b3 += (row[r + 1] + row[l + 1]) * k.g[d];
                b6 += (row[r + 1] - row[l + 1]) * k.xg[d];
                b5 += (row[r + 2] + row[l + 2]) * k.g[d];
            }
            let out = &mut dst[(y * w + x) * 5..][..5];
            out[0] = b3 * k.ig11;
            out[1] = b2 * k.ig11;
            out[2] = b1 * k.ig03 + b5 * k.ig33;
            out[3] = b1 * k.ig03 + b4 * k.ig33;
            out[4] = b6 * k.ig55;
        }
    }
    dst
}

// ----------------------------------------------------------------------------
// Displacement estimation
// ----------------------------------------------------------------------------

/// Per-pixel normal equations `[g11, g12, g22, h1, h2]` (y first) for the
/// current flow estimate.
fn update_matrices(r0: &[f32], r1: &[f32], flow: &[f32], w: usize, h: usize) -> Vec<f32> {
    let mut m = vec![0.0f32; w * h * 5];
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let dx = flow[i * 2];
            let dy = flow[i * 2 + 1];
            let fx = x as f32 + dx;
            let fy = y as f32 + dy;
            let x1 = fx.floor();
            let y1 = fy.floor();
            let ax = fx - x1;
            let ay = fy - y1;
            let p0 = &r0[i * 5..][..5];

            let in_bounds =
                x1 >= 0.0 && y1 >= 0.0 && (x1 as usize) + 1 < w && (y1 as usize) + 1 < h;
            let (s0, s1, r4, r5, r6) = if in_bounds {
                let a00 = (1.0 - ax) * (1.0 - ay);
                let a01 = ax * (1.0 - ay);
                let a10 = (1.0 - ax) * ay;
                let a11 = ax * ay;
                let i00 = ((y1 as usize) * w + x1 as usize) * 5;
                let i01 = i00 + 5;
                let i10 = i00 + w * 5;
                let i11 = i10 + 5;
                let sample = |c: usize| {
                    a00 * r1[i00 + c] + a01 * r1[i01 + c] + a10 * r1[i10 + c] + a11 * r1[i11 + c]
                };
                (
                    sample(0),
                    sample(1),
                    (p0[2] + sample(2)) * 0.5,
                    (p0[3] + sample(3)) * 0.5,
                    (p0[4] + sample(4)) * 0.25,
                )
            } else {
                (0.0, 0.0, p0[2], p0[3], p0[4] * 0.5)
            };

            let mut r2 = (p0[0] - s0) * 0.5;
            let mut r3 = (p0[1] - s1) * 0.5;
            r2 += r4 * dy + r6 * dx;
            r3 += r6 * dy + r5 * dx;

            let scale = border_scale(x, w) * border_scale(y, h);
            let (r2, r3, r4, r5, r6) = (r2 * scale, r3 * scale, r4 * scale, r5 * scale, r6 * scale);

            let out = &mut m[i * 5..][..5];
            out[0] = r4 * r4 + r6 * r6;
            out[1] = (r4 + r5) * r6;
            out[2] = r5 * r5 + r6 * r6;
            out[3] = r4 * r2 + r6 * r3;
            out[4] = r6 * r2 + r5 * r3;
        }
    }
    m
}

fn border_scale(i: usize, len: usize) -> f32 {
    let mut scale = 1.0;
    if i < BORDER {
        scale *= BORDER_WEIGHTS[i];
    }
    if i + BORDER >= len {
        scale *= BORDER_WEIGHTS[len - i - 1];
    }
    scale
}

#[allow(clippy::too_many_arguments)]
fn update_flow(
    r0: &[f32],
    r1: &[f32],
    flow: &mut [f32],
    m: &mut Vec<f32>,
    w: usize,
    h: usize,
    winsize: usize,
    refresh: bool,
) {
    let blurred = box_blur_channels(m, w, h, 5, winsize);
    for (v, b) in flow.chunks_exact_mut(2).zip(blurred.chunks_exact(5)) {
        let (g11, g12, g22, h1, h2) = (b[0], b[1], b[2], b[3], b[4]);
        let idet = 1.0 / (g11 * g22 - g12 * g12 + 1e-3);
        v[0] = (g11 * h2 - g12 * h1) * idet;
        v[1] = (g22 * h1 - g12 * h2) * idet;
    }
    if refresh {
        *m = update_matrices(r0, r1, flow, w, h);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn textured(w: u32, h: u32, shift_x: f32, shift_y: f32) -> GrayFrame {
        GrayFrame::from_fn(w, h, |x, y| {
            let fx = x as f32 - shift_x;
            let fy = y as f32 - shift_y;
            let v = 128.0
                + 45.0 * (std::f32::consts::TAU * fx / 23.0).sin()
                + 45.0 * (std::f32::consts::TAU * fy / 19.0).cos();
            v.round().clamp(0.0, 255.0) as u8
        })
    }

    fn interior_mean(field: &FlowField, margin: usize) -> (f32, f32) {
        let mut sum = (0.0f32, 0.0f32);
        let mut n = 0.0f32;
        for y in margin..field.height - margin {
            for x in margin..field.width - margin {
                let (dx, dy) = field.vector(x, y).unwrap_or_default();
                sum.0 += dx;
                sum.1 += dy;
                n += 1.0;
            }
        }
        (sum.0 / n, sum.1 / n)
    }

    #[test]
    fn kernel_inverse_entries_are_consistent() {
        let k = PolyKernel::new(5, 1.2);
        assert_abs_diff_eq!(k.g.iter().sum::<f32>() * 2.0 - k.g[0], 1.0, epsilon = 1e-5);
        assert!(k.ig11 > 0.0);
        assert!(k.ig33 > 0.0);
        assert!(k.ig03 < 0.0);
    }

    #[test]
    fn expansion_recovers_linear_ramp() {
        let (w, h) = (24usize, 24usize);
        let src: Vec<f32> = (0..w * h).map(|i| 3.0 * (i % w) as f32 + 1.5 * (i / w) as f32).collect();
        let k = PolyKernel::new(5, 1.2);
        let r = poly_expansion(&src, w, h, &k);
        let c = (12 * w + 12) * 5;
        assert_abs_diff_eq!(r[c], 1.5, epsilon = 1e-3);
        assert_abs_diff_eq!(r[c + 1], 3.0, epsilon = 1e-3);
        assert_abs_diff_eq!(r[c + 2], 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(r[c + 3], 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(r[c + 4], 0.0, epsilon = 1e-3);
    }

    #[test]
    fn identical_frames_have_zero_flow() -> Result<()> {
        let frame = textured(64, 48, 0.0, 0.0);
        let mut backend = FarnebackBackend::default();
        let field = backend.compute(&frame, &frame)?;
        // Only the replicated right/bottom border contributes a residual.
        assert!(field.polar().all(|(mag, _)| mag < 0.5));
        let (dx, dy) = interior_mean(&field, 16);
        assert!(dx.abs() < 1e-2 && dy.abs() < 1e-2, "dx={dx} dy={dy}");
        Ok(())
    }

    #[test]
    fn horizontal_shift_is_recovered() -> Result<()> {
        let prev = textured(96, 72, 0.0, 0.0);
        let next = textured(96, 72, 2.0, 0.0);
        let mut backend = FarnebackBackend::default();
        let field = backend.compute(&prev, &next)?;
        let (dx, dy) = interior_mean(&field, 12);
        assert!((dx - 2.0).abs() < 0.5, "dx={dx}");
        assert!(dy.abs() < 0.5, "dy={dy}");
        Ok(())
    }

    #[test]
    fn vertical_shift_is_recovered() -> Result<()> {
        let prev = textured(96, 72, 0.0, 0.0);
        let next = textured(96, 72, 0.0, -2.0);
        let mut backend = FarnebackBackend::default();
        let field = backend.compute(&prev, &next)?;
        let (dx, dy) = interior_mean(&field, 12);
        assert!(dx.abs() < 0.5, "dx={dx}");
        assert!((dy + 2.0).abs() < 0.5, "dy={dy}");
        Ok(())
    }

    #[test]
    fn mismatched_frames_are_rejected() {
        let mut backend = FarnebackBackend::default();
        let err = backend
            .compute(&textured(10, 10, 0.0, 0.0), &textured(12, 10, 0.0, 0.0))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::AnalysisError>(),
            Some(crate::AnalysisError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn params_validation_rejects_even_window() {
        let params = FarnebackParams {
            winsize: 14,
            ..FarnebackParams::default()
        };
        assert!(params.validate().is_err());
        assert!(FarnebackParams::default().validate().is_ok());
    }
}
