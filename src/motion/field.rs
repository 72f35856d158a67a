use std::f32::consts::TAU;

/// Dense motion field: one `(dx, dy)` displacement per pixel, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowField {
    pub width: usize,
    pub height: usize,
    data: Vec<f32>,
}

impl FlowField {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height * 2],
        }
    }

    /// Wrap an interleaved `[dx0, dy0, dx1, dy1, ...]` buffer.
    pub(crate) fn from_interleaved(width: usize, height: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width * height * 2);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vector(&self, x: usize, y: usize) -> Option<(f32, f32)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 2;
        Some((self.data[i], self.data[i + 1]))
    }

    pub fn vectors(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.data.chunks_exact(2).map(|v| (v[0], v[1]))
    }

    /// Polar form of every vector: `(magnitude, angle)` with the angle in
    /// radians within `[0, 2π)`, measured from +x towards +y (image rows grow
    /// downwards).
    pub fn polar(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.vectors().map(|(dx, dy)| {
            let mag = (dx * dx + dy * dy).sqrt();
            let mut ang = dy.atan2(dx);
            if ang < 0.0 {
                ang += TAU;
            }
            if ang >= TAU {
                ang = 0.0;
            }
            (mag, ang)
        })
    }

    /// Mean displacement over all pixels.
    pub fn mean(&self) -> (f32, f32) {
        if self.is_empty() {
            return (0.0, 0.0);
        }
        let (sx, sy) = self
            .vectors()
            .fold((0.0f64, 0.0f64), |acc, (dx, dy)| (acc.0 + dx as f64, acc.1 + dy as f64));
        let n = self.len() as f64;
        ((sx / n) as f32, (sy / n) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn polar_angles_cover_full_circle() {
        let field = FlowField::from_interleaved(4, 1, vec![1.0, 0.0, 0.0, 2.0, -3.0, 0.0, 0.0, -1.0]);
        let polar: Vec<_> = field.polar().collect();
        assert_abs_diff_eq!(polar[0].1, 0.0);
        assert_abs_diff_eq!(polar[1].0, 2.0);
        assert_abs_diff_eq!(polar[1].1, FRAC_PI_2);
        assert_abs_diff_eq!(polar[2].1, PI);
        assert_abs_diff_eq!(polar[3].1, 3.0 * FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn mean_of_empty_field_is_zero() {
        assert_eq!(FlowField::zeros(0, 0).mean(), (0.0, 0.0));
    }
}
