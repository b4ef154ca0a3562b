//! Variable-support convolution kernels for resampling.
//!
//! A kernel's footprint depends on the scale factor: when downsampling the
//! support is widened by the reciprocal of the scale so the kernel doubles
//! as an anti-aliasing pre-filter. Weights are precomputed per output index
//! into a flat table before any pixel work starts, so the per-pixel path is
//! a plain weighted sum with no dispatch.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Kernel family named by a destination's resize role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelFamily {
    #[default]
    Lanczos,
}

/// A 1D reconstruction filter evaluated at unit scale.
pub trait Kernel1D: Sync {
    /// Support radius in source samples.
    fn support(&self) -> f64;

    /// Filter value at distance `x` from the kernel center.
    fn eval(&self, x: f64) -> f64;
}

/// Windowed-sinc (Lanczos) kernel with a configurable lobe count.
#[derive(Debug, Clone, Copy)]
pub struct Lanczos {
    radius: f64,
    r_radius: f64,
}

impl Lanczos {
    pub const DEFAULT_RADIUS: f64 = 3.0;

    pub fn new(radius: f64) -> Self {
        let radius = if radius > 0.0 { radius } else { Self::DEFAULT_RADIUS };
        Self { radius, r_radius: 1.0 / radius }
    }
}

impl Default for Lanczos {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RADIUS)
    }
}

impl Kernel1D for Lanczos {
    fn support(&self) -> f64 {
        self.radius
    }

    fn eval(&self, x: f64) -> f64 {
        let ax = x.abs();
        if ax < 1e-6 {
            return 1.0;
        }
        if ax >= self.radius {
            return 0.0;
        }
        let pix = PI * x;
        (self.radius * pix.sin() * (pix * self.r_radius).sin()) / (PI * PI * x * x)
    }
}

pub fn make_kernel(family: KernelFamily, support: f64) -> Lanczos {
    match family {
        KernelFamily::Lanczos => Lanczos::new(support),
    }
}

/// One output sample's contribution list: taps start at source index
/// `start` and carry one weight each.
#[derive(Debug, Clone)]
pub struct WeightRow {
    pub start: usize,
    pub weights: Vec<f32>,
}

/// Precomputed variable-support weight table for one axis of a crop/resize.
///
/// Covers output indices `0..out_len`, mapping them onto the fractional
/// source interval `[from_start, from_start + from_size)`. Border taps that
/// would fall outside the source are truncated and the remaining weights
/// renormalized, so edge samples keep a unit-sum kernel instead of
/// darkening.
#[derive(Debug, Clone)]
pub struct Kernel1Dvar {
    rows: Vec<WeightRow>,
}

impl Kernel1Dvar {
    pub fn build<K: Kernel1D>(
        kernel: &K,
        from_start: f64,
        from_size: f64,
        from_max: usize,
        out_len: u32,
    ) -> Self {
        let scale = from_size / out_len as f64;

        // Downsampling widens the support to act as a pre-filter; the
        // argument is compressed so the widened footprint still spans the
        // kernel's lobes.
        let (range, norm_fact) = if scale < 1.0 {
            (kernel.support(), 1.0)
        } else {
            let range = kernel.support() * scale;
            (range, kernel.support() / range.ceil())
        };

        let rows = (0..out_len as usize)
            .map(|i| {
                let centre = from_start + i as f64 * scale;
                let left = (centre - range).floor().max(0.0) as usize;
                let right = ((centre + range).ceil() as usize).min(from_max - 1);

                let mut weights: Vec<f64> = (left..=right)
                    .map(|j| kernel.eval((centre - j as f64) * norm_fact))
                    .collect();

                // Unit sum, including truncated border rows.
                let total: f64 = weights.iter().sum();
                if total != 0.0 {
                    for w in &mut weights {
                        *w /= total;
                    }
                }

                WeightRow { start: left, weights: weights.iter().map(|&w| w as f32).collect() }
            })
            .collect();

        Self { rows }
    }

    pub fn out_len(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, i: usize) -> &WeightRow {
        &self.rows[i]
    }

    pub fn rows(&self) -> &[WeightRow] {
        &self.rows
    }
}

/// Separable composition of two [`Kernel1Dvar`] tables, one per axis — the
/// unit the resampler consumes for a whole frame.
#[derive(Debug, Clone)]
pub struct Kernel2Dvar {
    pub horizontal: Kernel1Dvar,
    pub vertical: Kernel1Dvar,
}

impl Kernel2Dvar {
    pub fn build<K: Kernel1D>(
        kernel: &K,
        frame: &crate::frame::Frame,
        source_width: u32,
        source_height: u32,
    ) -> Self {
        Self {
            horizontal: Kernel1Dvar::build(
                kernel,
                frame.crop_x(),
                frame.crop_w(),
                source_width as usize,
                frame.width(),
            ),
            vertical: Kernel1Dvar::build(
                kernel,
                frame.crop_y(),
                frame.crop_h(),
                source_height as usize,
                frame.height(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_unit_sums(table: &Kernel1Dvar) {
        for (i, row) in table.rows().iter().enumerate() {
            let sum: f64 = row.weights.iter().map(|&w| w as f64).sum();
            assert!((sum - 1.0).abs() < 1e-6, "row {i} sums to {sum}");
        }
    }

    #[test]
    fn lanczos_is_one_at_center_zero_at_integers() {
        let k = Lanczos::new(3.0);
        assert_eq!(k.eval(0.0), 1.0);
        for x in [1.0, 2.0, -1.0, -2.0] {
            assert!(k.eval(x).abs() < 1e-9, "eval({x})");
        }
        assert_eq!(k.eval(3.0), 0.0);
        assert_eq!(k.eval(5.0), 0.0);
    }

    #[test]
    fn weights_sum_to_one_when_upsampling() {
        let table = Kernel1Dvar::build(&Lanczos::default(), 0.0, 100.0, 100, 250);
        assert_eq!(table.out_len(), 250);
        assert_unit_sums(&table);
    }

    #[test]
    fn weights_sum_to_one_when_downsampling() {
        let table = Kernel1Dvar::build(&Lanczos::default(), 0.0, 100.0, 100, 31);
        assert_unit_sums(&table);
    }

    #[test]
    fn border_rows_are_truncated_and_renormalized() {
        let table = Kernel1Dvar::build(&Lanczos::default(), 0.0, 64.0, 64, 64);
        let first = table.row(0);
        assert_eq!(first.start, 0);
        let last = table.row(63);
        assert!(last.start + last.weights.len() <= 64);
        assert_unit_sums(&table);
    }

    #[test]
    fn downsampling_widens_the_footprint() {
        let up = Kernel1Dvar::build(&Lanczos::default(), 0.0, 100.0, 100, 200);
        let down = Kernel1Dvar::build(&Lanczos::default(), 0.0, 100.0, 100, 25);
        // Compare an interior row: the downsampling footprint covers
        // support / scale source samples.
        let up_taps = up.row(100).weights.len();
        let down_taps = down.row(12).weights.len();
        assert!(down_taps > up_taps, "down {down_taps} vs up {up_taps}");
        assert!(down_taps >= 3 * 4); // support 3 at scale 4
    }

    #[test]
    fn identity_scale_reproduces_the_sample() {
        // Unit scale with no crop offset puts all weight on the matching
        // source index.
        let table = Kernel1Dvar::build(&Lanczos::default(), 0.0, 64.0, 64, 64);
        for i in [5usize, 31, 50] {
            let row = table.row(i);
            let (best, w) = row
                .weights
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .unwrap();
            assert_eq!(row.start + best, i);
            assert!((*w - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn crop_offset_shifts_the_taps() {
        let table = Kernel1Dvar::build(&Lanczos::default(), 10.0, 20.0, 64, 20);
        let row = table.row(0);
        // Centre is at source coordinate 10; taps cluster around it.
        assert!(row.start >= 7 && row.start <= 10);
        let (best, _) = row
            .weights
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        assert_eq!(row.start + best, 10);
    }
}
