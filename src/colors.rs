//! Discrete color scale for the choropleth fills.
//!
//! Values are placed into intervals of an ascending boundary list and the
//! intervals are spread evenly over a sampled rainbow ramp, so the lowest
//! interval is violet and the highest red regardless of how many colors the
//! ramp carries.

use anyhow::{anyhow, Result};
use image::Rgba;
use std::f64::consts::PI;

#[derive(Debug, Clone)]
pub struct ColorScale {
    boundaries: Vec<f64>,
    colors: Vec<Rgba<u8>>,
}

impl ColorScale {
    /// Builds a scale over `boundaries` with one more ramp color than there
    /// are boundaries.
    pub fn new(boundaries: &[f64]) -> Result<Self> {
        if boundaries.len() < 3 {
            return Err(anyhow!(
                "Color scale needs at least 3 boundaries, got {}",
                boundaries.len()
            ));
        }
        if boundaries.iter().any(|b| !b.is_finite()) {
            return Err(anyhow!("Color scale boundaries must be finite"));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(anyhow!("Color scale boundaries must be strictly ascending"));
        }

        Ok(Self {
            boundaries: boundaries.to_vec(),
            colors: rainbow(boundaries.len() + 1),
        })
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn colors(&self) -> &[Rgba<u8>] {
        &self.colors
    }

    pub fn interval_count(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Index `i` of the interval with `boundaries[i] <= value < boundaries[i + 1]`.
    /// Values outside the boundaries clamp to the first or last interval.
    pub fn interval(&self, value: f64) -> usize {
        let above = self.boundaries.partition_point(|&b| b <= value);
        above.saturating_sub(1).min(self.interval_count() - 1)
    }

    /// Ramp index for `value`. Intervals are stretched across the whole ramp.
    pub fn color_index(&self, value: f64) -> usize {
        let last_color = self.colors.len() - 1;
        let last_interval = self.interval_count() - 1;
        (self.interval(value) * last_color / last_interval).min(last_color)
    }

    pub fn color(&self, value: f64) -> Rgba<u8> {
        self.colors[self.color_index(value)]
    }
}

/// `n` samples of the rainbow ramp from violet (x = 0) to red (x = 1).
pub fn rainbow(n: usize) -> Vec<Rgba<u8>> {
    let denom = n.saturating_sub(1).max(1) as f64;
    (0..n)
        .map(|k| {
            let x = k as f64 / denom;
            let r = (2.0 * x - 0.5).abs();
            let g = (x * PI).sin();
            let b = (x * PI / 2.0).cos();
            Rgba([channel(r), channel(g), channel(b), 255])
        })
        .collect()
}

fn channel(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BOUNDARIES;

    fn scale() -> ColorScale {
        ColorScale::new(&DEFAULT_BOUNDARIES).unwrap()
    }

    #[test]
    fn test_default_scale_shape() {
        let scale = scale();
        assert_eq!(scale.boundaries().len(), 25);
        assert_eq!(scale.colors().len(), 26);
        assert_eq!(scale.interval_count(), 24);
    }

    #[test]
    fn test_boundary_is_lower_inclusive() {
        let scale = scale();
        // [0.05, 0.075) is interval 2
        assert_eq!(scale.interval(0.05), 2);
        assert_eq!(scale.interval(0.049_999), 1);
        assert_eq!(scale.interval(0.35), 11);
        assert_eq!(scale.interval(0.347), 10);
    }

    #[test]
    fn test_out_of_range_clamps() {
        let scale = scale();
        assert_eq!(scale.interval(-0.5), 0);
        assert_eq!(scale.interval(0.0), 0);
        assert_eq!(scale.interval(0.99), 23);
        assert_eq!(scale.interval(1.0), 23);
        assert_eq!(scale.interval(7.0), 23);
        assert_eq!(scale.color_index(-1.0), 0);
        assert_eq!(scale.color_index(1.0), 25);
    }

    #[test]
    fn test_color_index_spreads_over_ramp() {
        let scale = scale();
        assert_eq!(scale.color_index(0.01), 0);
        assert_eq!(scale.color_index(0.03), 1);
        assert_eq!(scale.color_index(0.347), 10);
        assert_eq!(scale.color_index(0.96), 25);
    }

    #[test]
    fn test_monotonic_over_unit_interval() {
        let scale = scale();
        let mut previous = 0;
        for step in 0..=10_000 {
            let v = step as f64 / 10_000.0;
            let idx = scale.color_index(v);
            assert!(idx >= previous, "color index dropped at {}", v);
            previous = idx;
        }
        assert_eq!(previous, 25);
    }

    #[test]
    fn test_rainbow_endpoints() {
        let ramp = rainbow(26);
        // x = 0: r = 0.5, g = 0, b = 1
        assert_eq!(ramp[0], Rgba([128, 0, 255, 255]));
        // x = 1: r = 1, g = 0, b = 0
        let last = ramp[25];
        assert_eq!(last[0], 255);
        assert_eq!(last[1], 0);
        assert_eq!(last[2], 0);
    }

    #[test]
    fn test_rejects_bad_boundaries() {
        assert!(ColorScale::new(&[0.0, 0.5]).is_err());
        assert!(ColorScale::new(&[0.0, 0.5, 0.5, 1.0]).is_err());
        assert!(ColorScale::new(&[0.0, f64::NAN, 1.0]).is_err());
    }
}
