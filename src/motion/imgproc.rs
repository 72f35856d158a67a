//! Small image-processing kernels shared by frame resampling and optical flow.
//!
//! Images are row-major `f32` planes; multi-channel planes are interleaved.

/// Bilinear resize with pixel-center alignment and replicated borders.
pub(crate) fn resize_linear(src: &[f32], sw: usize, sh: usize, dw: usize, dh: usize) -> Vec<f32> {
    resize_linear_channels(src, sw, sh, dw, dh, 1)
}

/// Bilinear resize of an interleaved plane with `channels` values per pixel.
pub(crate) fn resize_linear_channels(
    src: &[f32],
    sw: usize,
    sh: usize,
    dw: usize,
    dh: usize,
    channels: usize,
) -> Vec<f32> {
    let mut dst = vec![0.0f32; dw * dh * channels];
    if sw == 0 || sh == 0 || dw == 0 || dh == 0 {
        return dst;
    }
    let xs: Vec<(usize, usize, f32)> = (0..dw).map(|d| sample_coord(d, sw, dw)).collect();
    for dy in 0..dh {
        let (y0, y1, fy) = sample_coord(dy, sh, dh);
        for (dx, &(x0, x1, fx)) in xs.iter().enumerate() {
            let out = (dy * dw + dx) * channels;
            for c in 0..channels {
                let p00 = src[(y0 * sw + x0) * channels + c];
                let p01 = src[(y0 * sw + x1) * channels + c];
                let p10 = src[(y1 * sw + x0) * channels + c];
                let p11 = src[(y1 * sw + x1) * channels + c];
                let top = p00 + (p01 - p00) * fx;
                let bottom = p10 + (p11 - p10) * fx;
                dst[out + c] = top + (bottom - top) * fy;
            }
        }
    }
    dst
}

fn sample_coord(d: usize, src_len: usize, dst_len: usize) -> (usize, usize, f32) {
    let scale = src_len as f32 / dst_len as f32;
    let f = (d as f32 + 0.5) * scale - 0.5;
    if f <= 0.0 {
        return (0, 1.min(src_len - 1), 0.0);
    }
    let i0 = f.floor() as usize;
    if i0 >= src_len - 1 {
        return (src_len - 1, src_len - 1, 0.0);
    }
    (i0, i0 + 1, f - i0 as f32)
}

/// 1-D Gaussian kernel of odd size `ksize`.
///
/// A non-positive `sigma` is derived from the kernel size; size 3 with no sigma
/// uses the fixed binomial kernel `[0.25, 0.5, 0.25]`.
pub(crate) fn gaussian_kernel(ksize: usize, sigma: f64) -> Vec<f32> {
    let ksize = ksize.max(1) | 1;
    if sigma <= 0.0 && ksize == 3 {
        return vec![0.25, 0.5, 0.25];
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (ksize / 2) as f64;
    let weights: Vec<f64> = (0..ksize)
        .map(|i| {
            let x = i as f64 - center;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Separable Gaussian blur with reflect-101 borders.
pub(crate) fn gaussian_blur(src: &[f32], w: usize, h: usize, ksize: usize, sigma: f64) -> Vec<f32> {
    let kernel = gaussian_kernel(ksize, sigma);
    let r = (kernel.len() / 2) as isize;
    let mut tmp = vec![0.0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &g) in kernel.iter().enumerate() {
                let sx = reflect101(x as isize + k as isize - r, w);
                acc += g * row[sx];
            }
            tmp[y * w + x] = acc;
        }
    }
    let mut dst = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &g) in kernel.iter().enumerate() {
                let sy = reflect101(y as isize + k as isize - r, h);
                acc += g * tmp[sy * w + x];
            }
            dst[y * w + x] = acc;
        }
    }
    dst
}

/// Normalized box filter over an interleaved plane, replicated borders.
pub(crate) fn box_blur_channels(
    src: &[f32],
    w: usize,
    h: usize,
    channels: usize,
    block: usize,
) -> Vec<f32> {
    let r = (block / 2) as isize;
    let scale = 1.0 / (block * block) as f32;
    let mut vsum = vec![0.0f32; w * h * channels];
    for y in 0..h {
        for k in -r..=r {
            let sy = clamp_index(y as isize + k, h);
            let src_row = &src[sy * w * channels..(sy + 1) * w * channels];
            let dst_row = &mut vsum[y * w * channels..(y + 1) * w * channels];
            for (d, &s) in dst_row.iter_mut().zip(src_row) {
                *d += s;
            }
        }
    }
    let mut dst = vec![0.0f32; w * h * channels];
    for y in 0..h {
        for x in 0..w {
            let out = (y * w + x) * channels;
            for k in -r..=r {
                let sx = clamp_index(x as isize + k, w);
                let inp = (y * w + sx) * channels;
                for c in 0..channels {
                    dst[out + c] += vsum[inp + c];
                }
            }
            for c in 0..channels {
                dst[out + c] *= scale;
            }
        }
    }
    dst
}

pub(crate) fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

fn reflect101(mut i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let n = len as isize;
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * n - 2 - i;
        }
    }
    i as usize
}
